//! # Taskmate Chat
//!
//! Terminal client for the Taskmate assistant.
//!
//! ```bash
//! TASKMATE_TOKEN=tm_... cargo run -p taskmate-client --bin taskmate-chat
//! ```
//!
//! Anything typed is sent to the assistant. Commands:
//!
//! - `/add <title> | <priority> | <YYYY-MM-DD> | <HH:MM>`: create a task
//!   (everything after the title is optional)
//! - `/tasks`: list tasks
//! - `/more`: load older messages
//! - `/quit`
//!
//! Ctrl-C while a reply streams stops the reply; Ctrl-C at the prompt
//! exits like `/quit`.

use std::io::Write;
use std::time::Instant;
use taskmate_client::{
    api::{HttpApi, TaskApi},
    config::ClientConfig,
    messages::ChatEntry,
    prompt::next_input,
    scroll::ScrollMetrics,
    session::{ChatSession, SendOutcome},
    task_dialog::{DialogError, TaskDialog},
    widget::{ChatWidget, Notice, WidgetOptions},
};
use taskmate_shared::chat::ChatRole;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "taskmate_client=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_entry(entry: &ChatEntry) {
    let who = match entry.role {
        ChatRole::User => "you",
        ChatRole::Assistant => "assistant",
    };
    println!(
        "[{}] {}: {}",
        entry.created_at.format("%Y-%m-%d %H:%M"),
        who,
        entry.display_content()
    );
}

fn print_notices(widget: &mut ChatWidget) {
    for notice in widget.take_notices() {
        match notice {
            Notice::Error(message) => eprintln!("! {}", message),
        }
    }
}

/// Builds a task from `/add` arguments and creates it
async fn add_task(api: &HttpApi, args: &str) -> anyhow::Result<()> {
    let mut fields = args.split('|').map(str::trim);
    let mut dialog = TaskDialog::new();
    dialog.open();
    dialog.set_title(fields.next().unwrap_or_default());

    if let Some(priority) = fields.next().filter(|p| !p.is_empty()) {
        dialog.set_priority(priority.parse().map_err(anyhow::Error::msg)?);
    }
    if let Some(date) = fields.next() {
        dialog.set_due_date_input(date)?;
    }
    if let Some(time) = fields.next() {
        dialog.set_due_time_input(time)?;
    }

    let mut new_task = None;
    if !dialog.submit(|task| new_task = Some(task)) {
        println!("A task needs a title");
        return Ok(());
    }

    if let Some(task) = new_task {
        let created = api.create_task(&task).await?;
        println!("Added \"{}\" ({})", created.task.title, created.task.priority);
    }
    Ok(())
}

async fn list_tasks(api: &HttpApi) -> anyhow::Result<()> {
    let tasks = api.list_tasks().await?;
    if tasks.is_empty() {
        println!("No tasks");
    }

    for entry in tasks {
        let task = entry.task;
        let due = match (task.due_date, task.due_time.as_deref()) {
            (Some(date), Some(time)) => format!(" due {} {}", date, time),
            (Some(date), None) => format!(" due {}", date),
            (None, Some(time)) => format!(" at {}", time),
            (None, None) => String::new(),
        };
        println!(
            "[{}] {} ({}){}",
            if task.completed { "x" } else { " " },
            task.title,
            task.priority,
            due
        );
        for subtask in entry.subtasks {
            println!("    [{}] {}", if subtask.completed { "x" } else { " " }, subtask.title);
        }
    }
    Ok(())
}

/// Streams one reply to stdout; Ctrl-C stops it
async fn send_message(session: &mut ChatSession<HttpApi>, input: &str) {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut printed = 0usize;
    let mut shown_tool = None;
    let outcome = session
        .send(input, &cancel, |widget| {
            let Some(reply) = widget.messages().last().filter(|m| m.role == ChatRole::Assistant)
            else {
                return;
            };

            let tool = widget.current_tool(Instant::now());
            if let Some(name) = tool.filter(|_| tool != shown_tool) {
                print!("\n  (using {})\n", name);
            }
            shown_tool = tool;

            let content = reply.display_content();
            match content.get(printed..) {
                Some(delta) => print!("{}", delta),
                None => print!("\n{}", content),
            }
            printed = content.len();
            let _ = std::io::stdout().flush();
        })
        .await;
    ctrl_c.abort();

    match outcome {
        SendOutcome::Completed => println!(),
        SendOutcome::Aborted => println!("\n(stopped)"),
        SendOutcome::Failed | SendOutcome::Rejected => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env()?;
    tracing::info!(api_url = %config.api_url, time_zone = %config.time_zone, "Taskmate chat starting");

    let api = HttpApi::new(&config.api_url, config.token.clone())?;
    let tasks = api.clone();
    let widget = ChatWidget::new(WidgetOptions {
        time_zone: Some(config.time_zone.clone()),
        ..Default::default()
    });
    let mut session = ChatSession::new(api, widget);

    session.open().await;
    for entry in session.widget().messages() {
        print_entry(entry);
    }
    print_notices(session.widget_mut());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let Some(line) = next_input(&mut lines, interrupt).await? else {
            println!();
            break;
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest)) {
            ("/quit", _) => break,
            ("/more", _) => {
                let before = session.widget().messages().len();
                // A scroll position at the very top asks for the previous page
                let loaded = session.load_older(ScrollMetrics::default()).await;
                let added = session.widget().messages().len() - before;
                if loaded.is_some() && added > 0 {
                    for entry in &session.widget().messages()[..added] {
                        print_entry(entry);
                    }
                } else if !session.widget().has_more() {
                    println!("No older messages");
                }
            }
            ("/add", args) => match add_task(&tasks, args).await {
                Ok(()) => {}
                Err(e) => match e.downcast_ref::<DialogError>() {
                    Some(invalid) => println!("{}", invalid),
                    None => eprintln!("! Failed to add task: {}", e),
                },
            },
            ("/tasks", _) => {
                if let Err(e) = list_tasks(&tasks).await {
                    eprintln!("! Failed to load tasks: {}", e);
                }
            }
            _ if line.is_empty() => {}
            _ => {
                print!("assistant: ");
                send_message(&mut session, line).await;
            }
        }

        print_notices(session.widget_mut());
    }

    tracing::info!("Bye");
    Ok(())
}
