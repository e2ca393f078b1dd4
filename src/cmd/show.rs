/*!
`show.rs` - print the saved pipeline.

JSON Output Shape:
{
  "status": "ok",
  "saved": true,
  "path": "/home/u/.mlr_desktop_state.json",
  "command": "mlr --icsv head -n 4",
  "configuration": { ...state document... }
}
*/

use anyhow::Result;
use clap::Args;

use crate::cmd::format::{Role, StyleOptions, color, emoji};
use crate::cmd::shared::{AppContext, config_json, render_config};
use crate::utils::output;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute_show(ctx: &AppContext, args: ShowArgs) -> Result<()> {
    let (config, saved) = ctx.load_config()?;

    if args.json {
        let mut body = config_json(&config);
        body["saved"] = saved.into();
        body["path"] = ctx.state_path.display().to_string().into();
        output::print(&output::ok(body));
        return Ok(());
    }

    let style = StyleOptions::detect();
    println!("{}", render_config(&config, &style));
    if !saved {
        println!(
            "{} {}",
            emoji("info", &style),
            color(
                Role::Dim,
                format!("nothing saved yet at {}", ctx.state_path.display()),
                &style
            )
        );
    }
    Ok(())
}
