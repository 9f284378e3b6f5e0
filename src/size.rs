/// Render a byte count with a single-letter unit.
///
/// Values of at least 1 MiB are printed as whole mebibytes with an `M`
/// suffix, values of at least 1 KiB as whole kibibytes with `K`, anything
/// smaller as the plain number. Division always truncates.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes >= MIB {
        format!("{}M", bytes / MIB)
    } else if bytes >= KIB {
        format!("{}K", bytes / KIB)
    } else {
        bytes.to_string()
    }
}
