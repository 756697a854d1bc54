//! `sidewire enable-jit`: allow a process to execute unsigned code.

use anyhow::{Context, Result};
use sidewire::{Connection, DEVICE_ID_ENV, ServerConnection};

use crate::{Endpoint, OutputFormat};

/// Arguments for `sidewire enable-jit`.
#[derive(clap::Args)]
pub struct EnableJitArgs {
    #[command(flatten)]
    pub endpoint: Endpoint,

    /// Device identifier (default: $SIDEWIRE_DEVICE_ID).
    #[arg(long)]
    pub udid: Option<String>,

    /// Target process ID (default: this process).
    #[arg(long)]
    pub pid: Option<u32>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

/// Sends the enable request and reports the outcome.
pub async fn run<C: Connection>(mut client: ServerConnection<C>, args: EnableJitArgs) -> Result<()> {
    let udid = match args.udid {
        Some(udid) => udid,
        None => sidewire::device_id_from_env().with_context(|| {
            format!("no device identifier: pass --udid or set {DEVICE_ID_ENV}")
        })?,
    };
    let pid = args.pid.unwrap_or_else(std::process::id);

    let result = client.enable_unsigned_execution_for_process(&udid, pid).await;
    client.disconnect();
    result.with_context(|| format!("failed to enable unsigned execution for pid {pid}"))?;

    match args.format {
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "identifier": udid,
                "processId": pid,
                "enabled": true,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
        OutputFormat::Text => println!("unsigned execution enabled for pid {pid} on {udid}"),
    }
    Ok(())
}
