use crate::TransferError;

/// Validates a remote (POSIX) path before it is sent to the server.
///
/// Rejects:
/// - Empty paths
/// - Paths containing NUL bytes
pub fn validate_remote_path(path: &str) -> Result<(), TransferError> {
    if path.is_empty() {
        return Err(TransferError::InvalidPath("empty remote path".into()));
    }
    if path.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "NUL byte in remote path: {path:?}"
        )));
    }
    Ok(())
}

/// Joins a remote directory and a file name with `/`.
///
/// The file name must be a single component: no separators, not `.` or `..`.
/// Duplicate slashes at the join point are collapsed.
pub fn remote_upload_path(remote_dir: &str, file_name: &str) -> Result<String, TransferError> {
    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return Err(TransferError::InvalidPath(format!(
            "invalid file name: {file_name:?}"
        )));
    }
    if file_name.contains('/') || file_name.contains('\\') {
        return Err(TransferError::InvalidPath(format!(
            "file name must not contain separators: {file_name}"
        )));
    }

    let dir = remote_dir.trim_end_matches('/');
    let joined = if dir.is_empty() && remote_dir.starts_with('/') {
        format!("/{file_name}")
    } else if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    };

    validate_remote_path(&joined)?;
    Ok(joined)
}

/// Returns every ancestor of a remote directory, shortest first.
///
/// `/srv/a//b/` yields `["/srv", "/srv/a", "/srv/a/b"]`; relative paths
/// stay relative. `.` components are dropped.
pub fn remote_dir_prefixes(remote_dir: &str) -> Vec<String> {
    let absolute = remote_dir.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();

    for part in remote_dir.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        prefixes.push(current.clone());
    }
    prefixes
}
