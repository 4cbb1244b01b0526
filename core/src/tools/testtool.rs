//! Stub executables for exercising the external-tool plumbing in tests.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static SEQ: AtomicUsize = AtomicUsize::new(0);

/// Write an executable stub script into a per-process temp dir and return
/// its path. Paths are unique per call, so parallel tests never share one.
pub fn stub_tool(name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("testrig-stubs-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}-{}", SEQ.fetch_add(1, Ordering::Relaxed)));
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
