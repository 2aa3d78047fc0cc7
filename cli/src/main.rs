#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;
mod events;

use std::rc::Rc;

use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;

use tracecore::db::ColumnTable;
use tracecore::db::ConstraintOp;
use tracecore::db::DbSqliteTable;
use tracecore::db::DbSqliteTableContext;
use tracecore::db::QueryConstraints;
use tracecore::db::SqlValue;

use clap::Parser as _;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;


/// Columns whose values are best displayed as hexadecimal.
const HEX_COLUMNS: [&str; 6] = [
    "exact_offset",
    "start_offset",
    "start",
    "end",
    "load_bias",
    "rel_pc",
];


fn format_value(column: &str, value: &SqlValue) -> String {
    match value {
        // Addresses are stored bit cast into signed integers.
        SqlValue::Long(v) if HEX_COLUMNS.contains(&column) => format!("{:#x}", *v as u64),
        value => value.to_string(),
    }
}

/// Query `table` through the SQL adapter and print the result.
fn query(
    name: &str,
    table: ColumnTable,
    constraints: Vec<(&str, ConstraintOp, SqlValue)>,
    order_by: Option<(&str, bool)>,
) -> Result<()> {
    let context = DbSqliteTableContext::new_static(None, Rc::new(table));
    let table = DbSqliteTable::new(name, Rc::new(context))
        .with_context(|| format!("failed to create table `{name}`"))?;
    let schema = table.schema();
    let column = |name: &str| {
        schema
            .column_index(name)
            .with_context(|| format!("table has no column `{name}`"))
    };

    let mut qc = QueryConstraints::new();
    let mut values = Vec::with_capacity(constraints.len());
    for (name, op, value) in constraints {
        let () = qc.add_constraint(column(name)?, op);
        let () = values.push(value);
    }
    if let Some((name, desc)) = order_by {
        let () = qc.add_order_by(column(name)?, desc);
    }

    let plan = table.plan(&qc).context("failed to plan query")?;
    for idx in 0..values.len() {
        ensure!(plan.is_omitted(idx), "constraint {idx} cannot be applied");
    }

    let columns = schema
        .columns
        .iter()
        .filter(|column| !column.is_hidden)
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    println!("{}", columns.join("\t"));

    let mut cursor = table.create_cursor();
    let rows = cursor.scan(&plan, &values).context("failed to run query")?;
    for row in rows {
        let line = schema
            .columns
            .iter()
            .zip(&row)
            .filter(|(column, _value)| !column.is_hidden)
            .map(|(column, value)| format_value(&column.name, value))
            .collect::<Vec<_>>();
        println!("{}", line.join("\t"));
    }
    Ok(())
}

/// The handler for the 'frames' command.
fn frames(frames: args::Frames) -> Result<()> {
    let args::Frames {
        path,
        mapping,
        name,
        order_by,
        desc,
    } = frames;

    let mut loader = events::Loader::new();
    let () = loader.process_file(&path)?;
    let table = loader
        .tracker()
        .storage()
        .frame_table()
        .context("failed to export frame table")?;

    let mut constraints = Vec::new();
    if let Some(mapping) = mapping {
        let () = constraints.push(("mapping", ConstraintOp::Eq, SqlValue::from(mapping)));
    }
    if let Some(name) = name {
        let () = constraints.push(("name", ConstraintOp::Glob, SqlValue::from(name)));
    }
    let order_by = order_by.map(|order| (order.column(), desc));
    query("stack_profile_frame", table, constraints, order_by)
}

/// The handler for the 'mappings' command.
fn mappings(mappings: args::Mappings) -> Result<()> {
    let args::Mappings { path, name } = mappings;

    let mut loader = events::Loader::new();
    let () = loader.process_file(&path)?;
    let table = loader
        .tracker()
        .storage()
        .mapping_table()
        .context("failed to export mapping table")?;

    let constraints = name
        .map(|name| vec![("name", ConstraintOp::Glob, SqlValue::from(name))])
        .unwrap_or_default();
    query("stack_profile_mapping", table, constraints, None)
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    match args.command {
        args::Command::Frames(frames) => self::frames(frames),
        args::Command::Mappings(mappings) => self::mappings(mappings),
    }
}
