use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use strum::IntoEnumIterator;
use tabshield_core::{EvaluationCache, Model, SearchSummary};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn probe(url: &str, version: u32, capacity: u32, session: Option<bool>) {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Server").add_attribute(Attribute::Bold),
        Cell::new("Protocol"),
        Cell::new("Sessions"),
        Cell::new("Open/Close"),
    ]);

    let session_cell = match session {
        Some(true) => Cell::new("ok").fg(Color::Green),
        Some(false) => Cell::new("busy").fg(Color::Yellow),
        None => Cell::new("-"),
    };
    table.add_row(vec![
        Cell::new(url).add_attribute(Attribute::Bold),
        Cell::new(version).set_alignment(CellAlignment::Right),
        Cell::new(capacity).set_alignment(CellAlignment::Right),
        session_cell,
    ]);
    println!("\n{}", table);
}

pub fn search(summary: &SearchSummary, cache: &EvaluationCache) {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("Result").add_attribute(Attribute::Bold),
        Cell::new("Value"),
    ]);

    let verified = summary
        .verified_fitness
        .map_or_else(|| "-".to_string(), |v| format!("{:.3}", v));
    let cells = summary
        .best_cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    table.add_row(vec![
        Cell::new("Stopped"),
        Cell::new(summary.termination.to_string()).fg(Color::Cyan),
    ]);
    table.add_row(vec![
        Cell::new("Best fitness").add_attribute(Attribute::Bold),
        Cell::new(format!("{:.3}", summary.best_fitness)).fg(Color::Green),
    ]);
    table.add_row(vec![Cell::new("Verified (yminus)"), Cell::new(verified)]);
    table.add_row(vec![Cell::new("Generations"), Cell::new(summary.generations)]);
    table.add_row(vec![
        Cell::new("Evaluations"),
        Cell::new(format!(
            "{} ({} counted)",
            summary.evaluations, summary.counted_evaluations
        )),
    ]);
    if summary.truncated_evaluations > 0 {
        table.add_row(vec![
            Cell::new("Truncated"),
            Cell::new(summary.truncated_evaluations).fg(Color::Yellow),
        ]);
    }
    table.add_row(vec![
        Cell::new("Elapsed"),
        Cell::new(format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ]);
    table.add_row(vec![Cell::new("Order"), Cell::new(cells)]);
    println!("\n{}", table);

    let mut counters = new_table();
    counters.set_header(vec![
        Cell::new("Model").add_attribute(Attribute::Bold),
        Cell::new("Requests"),
        Cell::new("Hits").fg(Color::Green),
        Cell::new("Misses").fg(Color::Red),
    ]);
    for model in Model::iter() {
        let c = cache.counters(model);
        counters.add_row(vec![
            Cell::new(model),
            Cell::new(c.requests),
            Cell::new(c.hits),
            Cell::new(c.misses),
        ]);
    }
    for i in 1..=3 {
        if let Some(col) = counters.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }
    println!("{}", counters);
}
