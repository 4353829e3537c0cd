//! Debug utilities for inspecting plan graphs and row sets during test runs.
//!
//! Grounded on `testing.rs`'s old `TestPipeline::debug_print_graph` (itself
//! grounded on `pipeline.rs`'s node/edge snapshot idiom), generalized from an
//! untyped node/edge pair into a [`PlanGraph`]'s typed [`StepTopology`]
//! snapshot, plus a row-set pretty-printer for inspecting operator output.

use crate::record::FieldValue;
use crate::step::PlanGraph;

/// Print a plan graph's step topology to stderr: one line per step with its
/// kind, upstream, and downstream step ids.
///
/// Useful for debugging a test that builds a [`PlanGraph`] by hand and wants
/// to confirm the wiring matches what the test intended before running it.
pub fn debug_print_plan_graph(graph: &PlanGraph) {
    eprintln!("PlanGraph: {} step(s)", graph.step_count());
    for topo in graph.snapshot_topology() {
        let kind = graph.with_step(topo.id, |s| s.kind);
        eprintln!(
            "  step {:?} [{kind:?}]  upstream={:?}  downstream={:?}  sub_inputs={}",
            topo.id, topo.upstream, topo.downstream, topo.has_sub_inputs
        );
    }
}

/// Render one row as a compact, readable string, e.g. `(Int4(1), Character("x"), Null)`.
#[must_use]
pub fn format_row(row: &[FieldValue]) -> String {
    let fields: Vec<String> = row.iter().map(|v| format!("{v:?}")).collect();
    format!("({})", fields.join(", "))
}

/// Print a labeled row set to stderr, capped at the first 10 rows to avoid
/// spamming test output on large fixtures.
pub fn debug_dump_rows(label: &str, rows: &[Vec<FieldValue>]) {
    eprintln!("[Debug: {label}] {} row(s)", rows.len());
    for (i, row) in rows.iter().take(10).enumerate() {
        eprintln!("[Debug: {label}] [{i}]: {}", format_row(row));
    }
    if rows.len() > 10 {
        eprintln!("[Debug: {label}] ... ({} more rows)", rows.len() - 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    #[test]
    fn format_row_renders_each_field() {
        let row = vec![FieldValue::Int4(1), FieldValue::Null];
        assert_eq!(format_row(&row), "(Int4(1), Null)");
    }

    #[test]
    fn debug_print_plan_graph_does_not_panic_on_a_disconnected_graph() {
        let graph = PlanGraph::new();
        graph.insert_step(StepKind::Process, 1);
        debug_print_plan_graph(&graph);
    }
}
