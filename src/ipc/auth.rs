// SPDX-License-Identifier: MIT
use anyhow::Result;
use std::path::Path;
use uuid::Uuid;

/// Return the auth token for this engine instance.
///
/// On first call, generates a random 32-character hex token and writes it to
/// `{data_dir}/auth_token` with user-only read/write permissions (mode 0600
/// on Unix). On subsequent calls, reads and returns the existing token.
///
/// The token gates the local WebSocket port: the controller layer that fronts
/// the engine reads this file and presents the token on every connect. Actor
/// identity inside RPC params is only trusted because the connection itself
/// is token-authenticated.
pub fn get_or_create_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");

    if path.exists() {
        let token = std::fs::read_to_string(&path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let token = Uuid::new_v4().to_string().replace('-', "");

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let first = get_or_create_token(dir.path()).unwrap();
        let second = get_or_create_token(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn blank_token_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("auth_token"), "  \n").unwrap();
        let token = get_or_create_token(dir.path()).unwrap();
        assert_eq!(token.len(), 32);
    }
}
