use drivesync_core::Timestamp;

/// Name the local copy of a conflicting file is moved to before the remote
/// version is fetched: `dir/stem (conflict <secs>).ext`, stamped with the
/// local modification time.
pub fn conflict_path(rel_path: &str, stamp: Timestamp) -> String {
    let split = rel_path.rfind('/').map_or(0, |slash| slash + 1);
    let (dir, name) = rel_path.split_at(split);
    let tag = format!(" (conflict {})", stamp.sec);
    match name.rfind('.') {
        // a leading dot is part of the name, not an extension
        Some(dot) if dot > 0 => format!("{dir}{}{tag}{}", &name[..dot], &name[dot..]),
        _ => format!("{dir}{name}{tag}"),
    }
}
