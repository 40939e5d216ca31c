use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};

use socload_core::{RunContext, WorkerCommand, WorkerReport, run_population};

/// Coordinator-driven worker: read one command line from stdin, run the
/// assigned population share, print one report line to stdout. Stdout is
/// reserved for the report; anything else goes to stderr. The coordinator
/// keeps stdin open for the run; EOF on it means "wind down and report now".
pub async fn worker() -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    stdin
        .read_line(&mut line)
        .await
        .context("failed to read worker command from stdin")?;
    anyhow::ensure!(!line.trim().is_empty(), "empty worker command");

    let command: WorkerCommand =
        serde_json::from_str(line.trim()).context("invalid worker command")?;
    let worker_id = command.worker_id;
    let (cfg, registry) = command.into_parts().context("invalid worker config")?;

    let ctx = RunContext::new(&cfg, registry)?;

    // Terminal Ctrl-C reaches the whole process group; stop cooperatively
    // and still emit the report.
    let stop = ctx.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    // The coordinator closes our stdin to request an early stop.
    let stop = ctx.stop.clone();
    tokio::spawn(async move {
        let mut buf = String::new();
        loop {
            buf.clear();
            match stdin.read_line(&mut buf).await {
                Ok(0) | Err(_) => {
                    stop.stop();
                    break;
                }
                Ok(_) => {}
            }
        }
    });

    let summary = run_population(&ctx, &cfg, None).await?;

    let report = WorkerReport { worker_id, summary };
    let line = serde_json::to_string(&report).context("failed to encode worker report")?;
    println!("{line}");
    Ok(())
}
