//! `kanban`: command-line client for collaborative kanban boards.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/kanban/config.toml`).
//!
//! ```bash
//! # Log in and keep the token
//! export KANBAN_TOKEN=$(kanban login alice@example.com --password secret)
//!
//! # Work with a board
//! kanban boards
//! kanban add-task <board> <column> "Write docs" --priority high --tag docs
//! kanban reorder-task <board> <task> 0
//!
//! # Follow edit locks
//! kanban --push-url ws://127.0.0.1:8080/ws watch
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;

use kanban::api::http::HttpBoardApi;
use kanban::api::{ApiError, UserApi};
use kanban::config::{CliArgs, ClientConfig, Command};
use kanban::drag::DragGesture;
use kanban::gateway::{BoardGateway, GatewayError};
use kanban::locks::{EditLockChannel, LockError};
use kanban::push::{PushClient, PushError, PushMessage, spawn_lock_sync};
use kanban::session::Session;
use kanban::store::BoardStore;
use kanban_proto::api::{NewTask, Register};
use kanban_proto::board::{Board, BoardId, ColumnId, Priority, Reaction, Task, TaskId, UserId};
use kanban_proto::push::{EntityKey, PushEvent};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Push(#[from] PushError),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn notice(&self) -> String {
        match self {
            Self::Gateway(e) => e.notice(),
            Self::Api(e) if e.requires_login() => {
                "Your session has expired. Please log in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

type Gateway = BoardGateway<HttpBoardApi>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let Some(command) = cli.command else {
        eprintln!("no command given, see --help");
        return ExitCode::FAILURE;
    };

    tracing::info!(api_url = %config.api_url, "kanban starting");
    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::warn!(err = %e, "command failed");
            eprintln!("{}", e.notice());
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Stdout carries command output, so logs go to a file. The returned guard
/// flushes buffered entries when dropped.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("kanban.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let session = Arc::new(
        config
            .token
            .clone()
            .map_or_else(Session::new, Session::with_token),
    );
    let api = Arc::new(HttpBoardApi::new(
        &config.api_url,
        Arc::clone(&session),
        config.request_timeout,
    )?);
    let gateway = BoardGateway::new(Arc::clone(&api), BoardStore::shared(), Arc::clone(&session));

    match command {
        Command::Register {
            username,
            email,
            password,
        } => {
            let request = Register {
                username,
                email,
                password,
            };
            session.register(&*api, &request).await?;
            print_token(&session);
        }
        Command::Login { email, password } => {
            session.login(&*api, &email, &password).await?;
            print_token(&session);
        }
        Command::Profile { username, email } => {
            let current = session.load_user(&*api).await?;
            let user = if username.is_none() && email.is_none() {
                current
            } else {
                let username = username.unwrap_or(current.username);
                let email = email.unwrap_or(current.email);
                session.update_profile(&*api, &username, &email).await?
            };
            println!("{}\t{}\t{}", user.id, user.username, user.email);
        }
        Command::Boards => {
            gateway.load_boards().await?;
            let me = session.load_user(&*api).await?.id;
            for board in gateway.store().lock().boards() {
                let role = if board.owner == me { "owner" } else { "shared" };
                println!(
                    "{}\t{}\t{} columns\t{role}",
                    board.id,
                    board.title,
                    board.columns.len()
                );
            }
        }
        Command::CreateBoard { title } => {
            let board = gateway.create_board(&title).await?;
            println!("{}", board.id);
        }
        Command::Show { board } => {
            let board = open(&gateway, &board).await?;
            print_board(&board);
        }
        Command::AddColumn { board, title } => {
            open(&gateway, &board).await?;
            print_board(&gateway.add_column(&title).await?);
        }
        Command::RenameColumn {
            board,
            column,
            title,
        } => {
            open(&gateway, &board).await?;
            print_board(&gateway.rename_column(&ColumnId::from(column.as_str()), &title).await?);
        }
        Command::MoveColumn {
            board,
            column,
            index,
        } => {
            open(&gateway, &board).await?;
            print_board(&gateway.move_column(&ColumnId::from(column.as_str()), index).await?);
        }
        Command::DeleteColumn { board, column } => {
            open(&gateway, &board).await?;
            print_board(&gateway.delete_column(&ColumnId::from(column.as_str())).await?);
        }
        Command::AddTask {
            board,
            column,
            title,
            description,
            priority,
            tags,
        } => {
            open(&gateway, &board).await?;
            let task = NewTask {
                title,
                description,
                priority: parse_priority(&priority)?,
                tags,
            };
            print_board(&gateway.add_task(&ColumnId::from(column.as_str()), task).await?);
        }
        Command::EditTask {
            board,
            task,
            title,
            description,
            priority,
            color,
        } => {
            let board = open(&gateway, &board).await?;
            let task_id = TaskId::from(task.as_str());
            let mut draft = board
                .task(&task_id)
                .cloned()
                .ok_or_else(|| GatewayError::TaskNotFound(task_id.clone()))?;
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(description) = description {
                draft.description = description;
            }
            if let Some(priority) = priority {
                draft.priority = parse_priority(&priority)?;
            }
            if let Some(color) = color {
                draft.color = color;
            }
            let user = session.load_user(&*api).await?;
            edit_with_lock(&gateway, config, &session, user.id, draft).await?;
        }
        Command::MoveTask { board, task, to } => {
            let board = open(&gateway, &board).await?;
            let task_id = TaskId::from(task.as_str());
            let source = column_of(&board, &task_id)?;
            let gesture = DragGesture::begin_task(task_id, source);
            drop_and_report(&gateway, &gesture, &board, &ColumnId::from(to.as_str())).await?;
        }
        Command::ReorderTask { board, task, index } => {
            let board = open(&gateway, &board).await?;
            let task_id = TaskId::from(task.as_str());
            let column = column_of(&board, &task_id)?;
            let mut gesture = DragGesture::begin_task(task_id, column.clone());
            gesture.hover_task(index);
            drop_and_report(&gateway, &gesture, &board, &column).await?;
        }
        Command::DeleteTask { board, task } => {
            let board = open(&gateway, &board).await?;
            let task_id = TaskId::from(task.as_str());
            let column = column_of(&board, &task_id)?;
            print_board(&gateway.delete_task(&column, &task_id).await?);
        }
        Command::Search {
            board,
            column,
            query,
        } => {
            open(&gateway, &board).await?;
            let store = gateway.store().lock();
            for task in store.search_tasks(&ColumnId::from(column.as_str()), &query) {
                println!("{}\t{}", task.id, task.title);
            }
        }
        Command::Comment { board, task, text } => {
            let board = open(&gateway, &board).await?;
            let task_id = TaskId::from(task.as_str());
            let column = column_of(&board, &task_id)?;
            let task = gateway.add_comment(&column, &task_id, &text).await?;
            println!("{} comments on {}", task.comments.len(), task.title);
        }
        Command::Like { board, task } => {
            react(&gateway, &session, &*api, &board, &task, Reaction::Like).await?;
        }
        Command::Dislike { board, task } => {
            react(&gateway, &session, &*api, &board, &task, Reaction::Dislike).await?;
        }
        Command::Share { board, email } => {
            gateway.share_board(&BoardId::from(board.as_str()), &email).await?;
            println!("shared with {email}");
        }
        Command::DeleteBoard { board } => {
            gateway.delete_board(&BoardId::from(board.as_str())).await?;
            println!("deleted {board}");
        }
        Command::Watch => {
            let user = session.load_user(&*api).await?;
            watch(config, &session, user.id).await?;
        }
    }
    Ok(())
}

fn print_token(session: &Session) {
    if let Some(token) = session.token() {
        println!("{token}");
    }
}

fn parse_priority(value: &str) -> Result<Priority, CliError> {
    value.parse().map_err(CliError::Usage)
}

/// Loads the board list and makes `board` current.
async fn open(gateway: &Gateway, board: &str) -> Result<Board, CliError> {
    gateway.load_boards().await?;
    let mut store = gateway.store().lock();
    if !store.select(&BoardId::from(board)) {
        return Err(CliError::Usage(format!("no board with id {board}")));
    }
    store
        .current()
        .cloned()
        .ok_or_else(|| CliError::Usage(format!("no board with id {board}")))
}

fn column_of(board: &Board, task_id: &TaskId) -> Result<ColumnId, CliError> {
    board
        .find_task(task_id)
        .and_then(|(ci, _)| board.columns.get(ci))
        .map(|column| column.id.clone())
        .ok_or_else(|| GatewayError::TaskNotFound(task_id.clone()).into())
}

async fn drop_and_report(
    gateway: &Gateway,
    gesture: &DragGesture,
    board: &Board,
    destination: &ColumnId,
) -> Result<(), CliError> {
    let Some(action) = gesture.drop_on(board, destination) else {
        println!("nothing to do");
        return Ok(());
    };
    gateway.apply_drop(action).await?;
    if let Some(board) = gateway.store().lock().current() {
        print_board(board);
    }
    Ok(())
}

async fn react(
    gateway: &Gateway,
    session: &Session,
    api: &impl UserApi,
    board: &str,
    task: &str,
    reaction: Reaction,
) -> Result<(), CliError> {
    session.load_user(api).await?;
    open(gateway, board).await?;
    let task = gateway.toggle_reaction(&TaskId::from(task), reaction).await?;
    println!("{}: +{} -{}", task.title, task.like_count(), task.dislike_count());
    Ok(())
}

/// Saves `draft` while announcing the edit on the push channel. Waits one
/// renewal period after connecting so a remote editor's lock is seen and the
/// save refused. If the push channel is unreachable the edit still goes
/// through.
async fn edit_with_lock(
    gateway: &Gateway,
    config: &ClientConfig,
    session: &Session,
    user_id: UserId,
    draft: Task,
) -> Result<(), CliError> {
    let key = EntityKey::task(draft.id.as_str());
    let locks = Arc::new(Mutex::new(EditLockChannel::new(user_id, config.lock_config())));
    let (handle, sync) = spawn_lock_sync(config.push_config(session.token()), locks);

    if !handle
        .wait_synced(config.connect_timeout, config.lock_renew_interval)
        .await
    {
        eprintln!("push channel unreachable, saving without a lock check");
    }
    handle.begin_edit(key.clone()).await?;
    let result = gateway.update_task(draft).await;
    handle.end_edit(&key).await;
    drop(handle);
    if tokio::time::timeout(config.connect_timeout * 2, sync).await.is_err() {
        tracing::debug!("push channel still connecting, giving up");
    }

    match result {
        Ok(board) => {
            print_board(&board);
            Ok(())
        }
        Err(e) => {
            if let Some(draft) = e.draft() {
                eprintln!("unsaved draft: {} [{}] {}", draft.title, draft.priority, draft.description);
            }
            Err(e.into())
        }
    }
}

/// Prints lock activity until Ctrl-C or until the server goes away.
async fn watch(config: &ClientConfig, session: &Session, user_id: UserId) -> Result<(), CliError> {
    let client = PushClient::connect(&config.push_config(session.token())).await?;
    let mut locks = EditLockChannel::new(user_id, config.lock_config());
    println!("watching {} (Ctrl-C to stop)", client.url());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            message = client.recv() => match message {
                Some(PushMessage::Connected) => println!("connected"),
                Some(PushMessage::Event(event)) => {
                    let now = Instant::now();
                    locks.apply(&event, now);
                    locks.prune_expired(now);
                    print_lock_event(&event, locks.len());
                }
                Some(PushMessage::Disconnected { reason }) => {
                    println!("disconnected: {reason}");
                    return Ok(());
                }
                None => return Ok(()),
            },
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::warn!(err = %e, "cannot listen for Ctrl-C");
                }
                client.close().await;
                return Ok(());
            }
        }
    }
}

fn print_lock_event(event: &PushEvent, held: usize) {
    match event {
        PushEvent::ItemLocked(notice) => {
            println!("{} {} locked by {} ({held} held)", notice.kind, notice.id, notice.user_id);
        }
        PushEvent::ItemUnlocked(notice) => {
            println!("{} {} unlocked ({held} held)", notice.kind, notice.id);
        }
        PushEvent::StartEdit(_) | PushEvent::StopEdit(_) => {}
    }
}

fn print_board(board: &Board) {
    println!("{} ({})", board.title, board.id);
    for column in &board.columns {
        println!("  {} ({})", column.title, column.id);
        for task in &column.tasks {
            let tags = if task.tags.is_empty() {
                String::new()
            } else {
                format!(" #{}", task.tags.join(" #"))
            };
            println!(
                "    [{}] {} ({}) +{} -{} {}c{tags}",
                task.priority,
                task.title,
                task.id,
                task.like_count(),
                task.dislike_count(),
                task.comments.len()
            );
        }
    }
}
