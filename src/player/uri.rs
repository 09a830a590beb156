// SPDX-License-Identifier: MPL-2.0

//! Input locator normalization.

use eyre::eyre;
use gtk::glib;
use tracing::info;

/// Accept `input` as a URI, or convert a filename to a `file://` URI.
///
/// Relative filenames resolve against the current working directory. When the
/// input is neither a valid URI nor convertible to one, the returned error
/// describes both failures.
pub fn normalize_uri(input: &str) -> eyre::Result<String> {
    if glib::Uri::is_valid(input, glib::UriFlags::NONE).is_ok() {
        return Ok(input.to_owned());
    }

    let path = std::path::Path::new(input);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    match glib::filename_to_uri(&absolute, None) {
        Ok(uri) => {
            info!(%uri, "input is not a valid URI, treated it as a filename");
            Ok(uri.to_string())
        }
        Err(err) => Err(eyre!(
            "input {input:?} is not a valid URI and could not be converted to a file URI: {err}"
        )),
    }
}
