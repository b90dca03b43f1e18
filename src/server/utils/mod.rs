pub mod fingerprint_utils;
pub mod relay_stream_utils;
pub mod url_utils;
