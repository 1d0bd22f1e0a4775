use crate::app::App;

use super::{task_header, task_row};

/// Run the `list-tasks` subcommand.
pub async fn run(app: &App, unassigned_only: bool) -> anyhow::Result<()> {
    let tasks = app.controller.list_tasks().await;
    let assignments = app.controller.assignments().await;

    let shown: Vec<_> = tasks
        .iter()
        .filter(|t| !unassigned_only || !assignments.contains_key(&t.id))
        .collect();

    println!(
        "{} open issues in {} ({} shown)",
        tasks.len(),
        app.github.full_name(),
        shown.len()
    );
    if shown.is_empty() {
        return Ok(());
    }
    println!("{}", task_header());
    for task in shown {
        println!(
            "{}",
            task_row(task, assignments.get(&task.id).map(String::as_str))
        );
    }
    Ok(())
}
