use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::PathBuf;
use todostore::{
    CategoryController, CategoryPatch, Config, FilterController, KeyValueStorage, NewTask, NoticeLevel, Notifier,
    Priority, SettingsPatch, SortKey, Store, Task, TaskController, TaskPatch, Theme,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "todostore CLI - Local-first todo list with categories, filters and backups")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to a YAML config file (default: <config dir>/todostore/config.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
    },

    /// List tasks
    List {
        /// all, active or completed
        #[arg(short, long, default_value = "all")]
        filter: String,
        #[arg(short, long, default_value = "all")]
        category: String,
        #[arg(short, long, default_value = "")]
        search: String,
        /// created, dueDate or priority (default: saved setting)
        #[arg(long)]
        sort: Option<String>,
    },

    /// Toggle a task between done and open
    Done { id: String },

    /// Edit a task
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,
        #[arg(long)]
        clear_due: bool,
    },

    /// Delete a task
    Rm { id: String },

    /// Delete all completed tasks
    ClearCompleted,

    /// Show task counts
    Stats,

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Show or change settings
    Settings {
        #[arg(long)]
        theme: Option<Theme>,
        /// created, dueDate or priority
        #[arg(long)]
        sort: Option<String>,
    },

    /// Write a dated JSON backup
    Export {
        /// Directory to write the backup into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Replace all data with a JSON backup
    Import { file: PathBuf },

    /// Reset everything to defaults
    ClearAll {
        /// Skip the safety check
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// List categories with task counts
    List,
    /// Add a category
    Add {
        name: String,
        #[arg(long, default_value = "#64748b")]
        color: String,
        #[arg(long, default_value = "📁")]
        icon: String,
    },
    /// Edit a category
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Delete a category; its tasks move to "all"
    Rm { id: String },
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// Prints controller notices to the terminal
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => println!("{} {}", "✓".green(), message),
            NoticeLevel::Info => println!("{} {}", "•".blue(), message),
            NoticeLevel::Error => eprintln!("{} {}", "✗".red(), message),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    // Setup tracing
    let level = match cli.verbose {
        0 => config.log_level.parse::<Level>().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let storage = config.open_storage()?;
    let mut store = Store::open(storage, config.storage.key.clone()).context("Failed to open store")?;

    match cli.command {
        Commands::Add {
            title,
            description,
            category,
            priority,
            due,
        } => {
            let mut fields = NewTask::new(title).priority(priority);
            if let Some(description) = description {
                fields = fields.description(description);
            }
            if let Some(category) = category {
                fields = fields.category(category);
            }
            if let Some(due) = due {
                fields = fields.due_date(due);
            }
            let id = TaskController::new(&mut store)
                .with_notifier(ConsoleNotifier)
                .add_task(fields)?;
            println!("  id: {}", id.dimmed());
        }
        Commands::List {
            filter,
            category,
            search,
            sort,
        } => {
            let mut filters = FilterController::new();
            filters.set_filter(filter);
            filters.set_category(category);
            filters.set_search_query(search);
            filters.set_sort_by(sort.unwrap_or_else(|| store.settings().sort_by.to_string()));

            let controller = TaskController::new(&mut store);
            let tasks = controller.filtered_tasks(&filters);
            if tasks.is_empty() {
                println!("No tasks");
            }
            let today = Local::now().date_naive();
            for task in tasks {
                print_task(task, today);
            }
        }
        Commands::Done { id } => {
            let id = resolve_task_id(&store, &id);
            let toggled = TaskController::new(&mut store)
                .with_notifier(ConsoleNotifier)
                .toggle_task_complete(&id)?;
            if toggled.is_none() {
                println!("No task matching '{}'", id);
            }
        }
        Commands::Edit {
            id,
            title,
            description,
            clear_description,
            category,
            priority,
            due,
            clear_due,
        } => {
            let id = resolve_task_id(&store, &id);
            let patch = TaskPatch {
                title,
                description: if clear_description { Some(None) } else { description.map(Some) },
                category,
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                completed: None,
            };
            if patch.is_empty() {
                return Err(eyre!("Nothing to change"));
            }
            let updated = TaskController::new(&mut store)
                .with_notifier(ConsoleNotifier)
                .update_task(&id, &patch)?;
            if !updated {
                println!("No task matching '{}'", id);
            }
        }
        Commands::Rm { id } => {
            let id = resolve_task_id(&store, &id);
            let deleted = TaskController::new(&mut store)
                .with_notifier(ConsoleNotifier)
                .delete_task(&id)?;
            if !deleted {
                println!("No task matching '{}'", id);
            }
        }
        Commands::ClearCompleted => {
            let removed = TaskController::new(&mut store)
                .with_notifier(ConsoleNotifier)
                .clear_completed()?;
            if removed == 0 {
                println!("No completed tasks");
            }
        }
        Commands::Stats => {
            let counts = TaskController::new(&mut store).task_counts();
            println!("Total:     {}", counts.total);
            println!("Active:    {}", counts.active.to_string().cyan());
            println!("Completed: {}", counts.completed.to_string().green());
            println!("Overdue:   {}", counts.overdue.to_string().red());
        }
        Commands::Category(command) => run_category(&mut store, command)?,
        Commands::Settings { theme, sort } => {
            if theme.is_some() || sort.is_some() {
                let patch = SettingsPatch {
                    theme,
                    sort_by: sort.as_deref().map(SortKey::from_name),
                };
                store.update_settings(&patch)?;
                println!("{} Settings saved", "✓".green());
            }
            let settings = store.settings();
            println!("theme:  {}", settings.theme);
            println!("sortBy: {}", settings.sort_by);
        }
        Commands::Export { dir } => {
            let path = store.write_export(&dir)?;
            println!("{} Exported to {}", "✓".green(), path.display());
        }
        Commands::Import { file } => {
            let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            if let Err(e) = store.import_data(&text) {
                eprintln!("{} Import failed: {}", "✗".red(), e);
                return Err(e.into());
            }
            println!(
                "{} Imported {} task(s), {} categories",
                "✓".green(),
                store.tasks().len(),
                store.categories().len()
            );
        }
        Commands::ClearAll { yes } => {
            if !yes {
                return Err(eyre!("Refusing to clear all data without --yes (export a backup first)"));
            }
            store.clear_all()?;
            println!("{} All data cleared", "✓".green());
        }
    }

    Ok(())
}

fn run_category<S: KeyValueStorage>(store: &mut Store<S>, command: CategoryCommands) -> Result<()> {
    let mut controller = CategoryController::new(store).with_notifier(ConsoleNotifier);
    match command {
        CategoryCommands::List => {
            for (category, count) in controller.category_counts() {
                println!(
                    "{} {:<12} {:<20} {}",
                    category.icon,
                    category.id.bold(),
                    category.name,
                    count.to_string().dimmed()
                );
            }
        }
        CategoryCommands::Add { name, color, icon } => {
            let id = controller.add_category(&name, &color, &icon)?;
            println!("  id: {}", id.dimmed());
        }
        CategoryCommands::Edit { id, name, color, icon } => {
            let patch = CategoryPatch { name, color, icon };
            if !controller.update_category(&id, &patch)? {
                println!("No category '{}'", id);
            }
        }
        CategoryCommands::Rm { id } => {
            if !controller.delete_category(&id)? {
                println!("No category '{}'", id);
            }
        }
    }
    Ok(())
}

// Accept a unique id suffix as shown by `list`; anything else passes through
fn resolve_task_id<S: KeyValueStorage>(store: &Store<S>, given: &str) -> String {
    let mut matches = store.tasks().iter().filter(|t| t.id == given || t.id.ends_with(given));
    match (matches.next(), matches.next()) {
        (Some(task), None) => task.id.clone(),
        _ => given.to_string(),
    }
}

fn short_id(id: &str) -> &str {
    let start = id.len().saturating_sub(8);
    id.get(start..).unwrap_or(id)
}

fn print_task(task: &Task, today: NaiveDate) {
    let mark = if task.completed { "[x]".green() } else { "[ ]".normal() };
    let title = if task.completed {
        task.title.dimmed()
    } else {
        task.title.normal()
    };
    let priority = match task.priority {
        Priority::Urgent => task.priority.as_str().red().bold(),
        Priority::High => task.priority.as_str().yellow(),
        Priority::Medium => task.priority.as_str().normal(),
        Priority::Low => task.priority.as_str().dimmed(),
    };

    let mut line = format!("{} {} {} {} ({})", mark, short_id(&task.id).dimmed(), title, priority, task.category);
    if let Some(due) = task.due_date {
        let due = format!("due {}", due);
        if task.is_overdue(today) {
            line.push_str(&format!(" {}", due.red()));
        } else {
            line.push_str(&format!(" {}", due));
        }
    }
    println!("{}", line);

    if let Some(description) = &task.description {
        println!("      {}", description.dimmed());
    }
}
