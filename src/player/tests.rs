// SPDX-License-Identifier: MPL-2.0

//! Unit tests for input locator normalization.

#[cfg(test)]
mod tests {
    use super::super::uri::normalize_uri;

    #[test]
    fn absolute_paths_become_file_uris() {
        assert_eq!(
            normalize_uri("/media/clip.mp4").unwrap(),
            "file:///media/clip.mp4"
        );
    }

    #[test]
    fn valid_uris_pass_through_unchanged() {
        assert_eq!(
            normalize_uri("file:///media/clip.mp4").unwrap(),
            "file:///media/clip.mp4"
        );
        assert_eq!(
            normalize_uri("https://example.com/stream.mp4").unwrap(),
            "https://example.com/stream.mp4"
        );
        assert_eq!(
            normalize_uri("rtsp://camera.local/feed").unwrap(),
            "rtsp://camera.local/feed"
        );
    }

    #[test]
    fn relative_paths_resolve_against_the_working_directory() {
        let uri = normalize_uri("clip.mp4").unwrap();
        assert!(uri.starts_with("file:///"), "got {uri}");
        assert!(uri.ends_with("/clip.mp4"), "got {uri}");

        let cwd = std::env::current_dir().unwrap();
        assert!(uri.contains(cwd.file_name().unwrap().to_str().unwrap()));
    }

    #[test]
    fn special_characters_are_percent_encoded() {
        assert_eq!(
            normalize_uri("/media/my clip.mp4").unwrap(),
            "file:///media/my%20clip.mp4"
        );
    }
}
