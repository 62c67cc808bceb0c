//! Task identifier generation.

/// Prefix of every delegated task id.
pub const TASK_ID_PREFIX: &str = "delegated";

/// Mint a task id of the form `delegated_<source_node_id>_<8 hex chars>`.
///
/// The suffix is not cryptographic; callers must still check for collisions
/// against live ids.
pub fn generate_task_id(source_node_id: &str) -> String {
    format!(
        "{TASK_ID_PREFIX}_{}_{:08x}",
        source_node_id,
        rand::random::<u32>()
    )
}

/// Split a task id into its source node id and hex suffix.
pub fn parse_task_id(task_id: &str) -> Option<(&str, &str)> {
    let rest = task_id.strip_prefix(TASK_ID_PREFIX)?.strip_prefix('_')?;
    let (node, suffix) = rest.rsplit_once('_')?;
    let well_formed = !node.is_empty()
        && suffix.len() == 8
        && suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
    well_formed.then_some((node, suffix))
}
