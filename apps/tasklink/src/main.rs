use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tasklink_client::{ClientConfig, DEFAULT_BASE_URL, TaskClient};
use tasklink_protocol::api::SubmitOptions;
use tasklink_protocol::{RecordingId, TaskEvent, TaskId};
use tasklink_stream::{DrainPolicy, FollowOutcome, StreamSession, follow_until_terminal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Debug, Parser)]
#[command(name = "tasklink")]
#[command(about = "Submit browser tasks and follow their event streams")]
struct Cli {
    #[arg(long, env = "TASKLINK_API_BASE", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,
    #[arg(long, default_value_t = 60, global = true)]
    timeout_secs: u64,
    /// Keep reading trailing events this long after a terminal status.
    #[arg(long, default_value_t = 0, global = true)]
    grace_ms: u64,
    /// Print raw JSON instead of rendered lines.
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a prompt and follow the task until it finishes.
    Run(RunArgs),
    /// Follow an existing task's event stream.
    Watch {
        task_id: String,
        #[arg(long)]
        via_gateway: bool,
    },
    Status {
        task_id: String,
    },
    Logs {
        task_id: String,
        #[arg(long)]
        since: Option<String>,
    },
    Tasks {
        #[arg(long)]
        limit: Option<usize>,
    },
    Cancel {
        task_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List recordings, or show one by id.
    Recordings {
        session_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        state: Option<String>,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    prompt: String,
    #[arg(long)]
    execute: bool,
    #[arg(long)]
    capture_context: bool,
    #[arg(long)]
    planner: Option<String>,
    #[arg(long)]
    llm_provider: Option<String>,
    #[arg(long)]
    llm_model: Option<String>,
    #[arg(long)]
    max_retries: Option<u32>,
    #[arg(long)]
    via_gateway: bool,
}

impl RunArgs {
    fn submit_options(&self) -> SubmitOptions {
        let mut options = SubmitOptions::default()
            .execute(self.execute)
            .capture_context(self.capture_context)
            .via_gateway(self.via_gateway);
        if let Some(planner) = &self.planner {
            options = options.planner(planner.clone());
        }
        options.llm_provider = self.llm_provider.clone();
        options.llm_model = self.llm_model.clone();
        options.max_retries = self.max_retries;
        options
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ClientConfig::new(&cli.base_url)
        .context("invalid --base-url")?
        .timeout(Duration::from_secs(cli.timeout_secs));
    let client = TaskClient::connect(config)?;
    let policy = if cli.grace_ms == 0 {
        DrainPolicy::Immediate
    } else {
        DrainPolicy::Grace(Duration::from_millis(cli.grace_ms))
    };

    match &cli.command {
        Command::Run(args) => {
            let handle = client.submit(&args.prompt, &args.submit_options()).await?;
            info!(task_id = %handle.task_id(), "following task");
            let session = client.open_stream(handle).await?;
            follow(session, policy, cli.json).await
        }
        Command::Watch {
            task_id,
            via_gateway,
        } => {
            let session = client
                .watch(TaskId::from_string(task_id.as_str()), *via_gateway)
                .await?;
            follow(session, policy, cli.json).await
        }
        Command::Status { task_id } => {
            let snapshot = client
                .dispatcher()
                .get_task_status(&TaskId::from_string(task_id.as_str()))
                .await?;
            if cli.json {
                print_json(&snapshot)
            } else {
                println!("{}", render::event_line(&TaskEvent::Status(snapshot)));
                Ok(())
            }
        }
        Command::Logs { task_id, since } => {
            let logs = client
                .dispatcher()
                .get_task_logs(&TaskId::from_string(task_id.as_str()), since.as_deref())
                .await?;
            for entry in logs {
                if cli.json {
                    print_json(&entry)?;
                } else {
                    println!("{}", render::event_line(&TaskEvent::Log(entry)));
                }
            }
            Ok(())
        }
        Command::Tasks { limit } => {
            let tasks = client.dispatcher().list_tasks(*limit).await?;
            for task in tasks {
                if cli.json {
                    print_json(&task)?;
                } else {
                    println!(
                        "{}  {}  dispatches={}  {}",
                        task.task_id,
                        task.last_status.as_deref().unwrap_or("-"),
                        task.total_dispatches,
                        task.prompt.as_deref().unwrap_or(""),
                    );
                }
            }
            Ok(())
        }
        Command::Cancel { task_id, reason } => {
            let reply = client
                .dispatcher()
                .cancel_task(&TaskId::from_string(task_id.as_str()), reason.as_deref())
                .await?;
            print_json(&reply)
        }
        Command::Recordings {
            session_id: Some(session_id),
            ..
        } => {
            let detail = client
                .dispatcher()
                .get_recording(&RecordingId::from_string(session_id.as_str()))
                .await?;
            print_json(&detail)
        }
        Command::Recordings {
            session_id: None,
            limit,
            state,
        } => {
            let listing = client
                .dispatcher()
                .list_recordings(*limit, state.as_deref())
                .await?;
            for recording in listing.recordings {
                if cli.json {
                    print_json(&recording)?;
                } else {
                    println!(
                        "{}  {}  {}",
                        recording.id,
                        recording.state,
                        recording.name.as_deref().unwrap_or(""),
                    );
                }
            }
            Ok(())
        }
    }
}

async fn follow(mut session: StreamSession, policy: DrainPolicy, json: bool) -> Result<()> {
    let closer = session.closer();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, closing stream");
            closer.close();
        }
    });

    let mut print_failure = None;
    let outcome = follow_until_terminal(&mut session, policy, |event| {
        let printed = if json {
            serde_json::to_string(event).map(|line| println!("{line}"))
        } else {
            println!("{}", render::event_line(event));
            Ok(())
        };
        if let Err(error) = printed {
            print_failure.get_or_insert(error);
        }
    })
    .await;
    interrupt.abort();

    if let Some(error) = print_failure {
        return Err(error).context("failed to encode event");
    }
    report(session.task_id(), outcome?)
}

fn report(task_id: &TaskId, outcome: FollowOutcome) -> Result<()> {
    if outcome.ended_before_terminal {
        bail!(
            "stream for task {task_id} ended after {} events without a terminal status",
            outcome.events_seen
        );
    }
    match outcome.terminal_status {
        Some(status) if outcome.succeeded() => {
            info!(%task_id, %status, events = outcome.events_seen, "task finished");
            Ok(())
        }
        Some(status) => bail!("task {task_id} ended with status {status}"),
        None => bail!("stream for task {task_id} ended before a terminal status"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
