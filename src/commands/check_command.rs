//! Check command implementation: validate an experiment file.
use crate::cli::ui::print_success;
use crate::cli::CheckArgs;
use crate::config::Experiment;
use crate::core::tree::NodeTemplate;
use crate::Result;

/// Execute the `check` subcommand.
///
/// Parses and validates the experiment file exactly as `run` would, then
/// reports what it found. Configuration errors propagate to `main` and
/// become a non-zero exit before any task could have run.
pub fn execute(args: CheckArgs) -> Result<()> {
    let experiment = Experiment::load(&args.config)?;
    print_success(&format!(
        "\"{}\" is valid: {} node(s), {} leaf command template(s)",
        experiment.name,
        count_nodes(&experiment.root),
        count_commands(&experiment.root),
    ));
    Ok(())
}

fn count_nodes(template: &NodeTemplate) -> usize {
    1 + template.children.iter().map(count_nodes).sum::<usize>()
}

fn count_commands(template: &NodeTemplate) -> usize {
    template.commands.as_ref().map_or(0, Vec::len)
        + template.children.iter().map(count_commands).sum::<usize>()
}
