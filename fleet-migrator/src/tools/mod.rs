//! Adapters that implement the fleet contracts on top of the real command-line tools.
pub mod atest;
pub mod command;
pub mod skylab;

pub use atest::AtestClient;
pub use skylab::SkylabClient;

/// Write an executable shell script standing in for a real tool.
#[cfg(test)]
pub(crate) fn fake_tool(script: &str) -> tempfile::TempPath {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let mut file = tempfile::Builder::new()
        .prefix("fake-tool-")
        .tempfile()
        .unwrap();
    writeln!(file, "#!/bin/sh\n{script}").unwrap();

    let path = file.into_temp_path();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
