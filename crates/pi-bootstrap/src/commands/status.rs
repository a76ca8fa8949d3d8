//! `status`: report which bring-up steps are already satisfied.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use pi_bootstrap::orchestrator::evaluate_preconditions;
use pi_bootstrap::{preflight, steps, ui};

use super::GlobalOptions;

/// Show prerequisite results and each step's precondition. Changes nothing.
#[derive(Args, Debug, Default)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Evaluate preflight and preconditions. Returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a prerequisite
    /// fails.
    #[allow(clippy::unused_async)]
    pub async fn run(&self, opts: &GlobalOptions) -> Result<u8> {
        let config = opts.load_config()?;
        let mut ctx = opts.context(config);

        let checks = preflight::collect(&mut ctx);
        let sequence = steps::bring_up_sequence();
        let states = evaluate_preconditions(&ctx, &sequence);

        if opts.json {
            let steps: Vec<_> = states
                .iter()
                .map(|(name, state)| json!({ "step": name, "precondition": state }))
                .collect();
            let report = json!({
                "host": ctx.hostname,
                "facts": ctx.facts,
                "preflight": checks,
                "steps": steps,
            });
            let text = serde_json::to_string_pretty(&report).context("serialize status")?;
            println!("{text}");
        } else {
            ui::print_section(&format!("📋 Status of {}", ctx.hostname));
            for check in &checks {
                ui::print_check_result(check);
            }
            println!();
            ui::print_status(&states);
        }

        preflight::ensure_passed(&checks)?;
        Ok(0)
    }
}
