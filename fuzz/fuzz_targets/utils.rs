/// Inputs are capped so pathological cases stay fast.
pub const MAX_INPUT_SIZE: usize = 64 * 1024;

/// The capped prefix of `data` as UTF-8, dropping at most one split trailing
/// code point.
pub fn truncate_utf8(data: &[u8]) -> Option<&str> {
    let capped = &data[..data.len().min(MAX_INPUT_SIZE)];
    match std::str::from_utf8(capped) {
        Ok(text) => Some(text),
        Err(err) if err.error_len().is_none() && capped.len() - err.valid_up_to() < 4 => {
            std::str::from_utf8(&capped[..err.valid_up_to()]).ok()
        }
        Err(_) => None,
    }
}
