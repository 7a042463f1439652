use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore, distributions::Alphanumeric};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

const LIST_KEY_LEN: usize = 12;
const SESSION_TOKEN_BYTES: usize = 32;

/// Create `path` (and its parent directories) if it does not exist yet.
/// Returns `true` when the file was created by this call.
pub fn ensure_file_exists(path: &Path) -> Result<bool, io::Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().create_new(true).write(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Random alphanumeric key used in list urls.
pub fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LIST_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Random session token, url-safe base64 without padding.
pub fn random_token() -> String {
    let mut buf = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_alphanumeric() {
        let key = random_key();
        assert_eq!(key.len(), LIST_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, random_key());
    }

    #[test]
    fn tokens_are_url_safe() {
        let token = random_token();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn ensure_file_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/db.sqlite");

        assert!(ensure_file_exists(&path).unwrap());
        assert!(path.exists());
        assert!(!ensure_file_exists(&path).unwrap());
    }
}
