//! In-memory tar packaging for file injection

use std::time::{SystemTime, UNIX_EPOCH};

use tar::{Builder, Header};

use crate::sandbox::SandboxError;

/// Pack named files into a single tar archive
///
/// Entries are written in the given order with mode 0644.
pub fn pack_files<'a>(
    files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> Result<Vec<u8>, SandboxError> {
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    let mut builder = Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder
            .append_data(&mut header, name, content)
            .map_err(SandboxError::Archive)?;
    }

    builder.into_inner().map_err(SandboxError::Archive)
}
