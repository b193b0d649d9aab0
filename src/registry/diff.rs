use super::entry::WindowEntry;

/// Membership-change detection between two registry snapshots.
///
/// Lengths differing counts as a change; otherwise ids are compared position
/// by position. This is not a set comparison: a reorder that keeps every
/// position's id intact elsewhere can go unnoticed.
pub fn did_windows_change(previous: &[WindowEntry], next: &[WindowEntry]) -> bool {
    if previous.len() != next.len() {
        return true;
    }

    previous
        .iter()
        .zip(next.iter())
        .any(|(prev, new)| prev.id != new.id)
}
