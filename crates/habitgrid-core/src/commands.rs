use std::fs;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{local_date, parse_date_expr, resolve_timezone};
use crate::grid::{self, DateRange};
use crate::habit::{Habit, Mark};
use crate::heatmap::HeatmapRenderer;
use crate::render::Renderer;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "info", "rename", "delete", "done", "cancel", "view", "remind", "_show",
        "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let tz = resolve_timezone(cfg.timezone().as_deref())?;
    let today = local_date(now, &tz);
    let command = inv.command.as_str();

    debug!(
        command,
        selectors = ?inv.selectors,
        args = ?inv.command_args,
        %today,
        "dispatching command"
    );

    match command {
        "add" => cmd_add(store, &inv.command_args, now),
        "list" => cmd_list(store, renderer, today),
        "info" => cmd_info(store, renderer, &inv.selectors, &inv.command_args, today),
        "rename" => cmd_rename(store, &inv.selectors, &inv.command_args, now),
        "delete" => cmd_delete(store, &inv.selectors, &inv.command_args),
        "done" => cmd_mark(store, &inv.selectors, &inv.command_args, Mark::Done, today, now),
        "cancel" => cmd_mark(store, &inv.selectors, &inv.command_args, Mark::Cancel, today, now),
        "view" => cmd_view(store, cfg, &inv.selectors, &inv.command_args, today),
        "remind" => cmd_remind(store, today),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, args, now))]
fn cmd_add(store: &mut DataStore, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");

    let name = plain_words(args).join(" ");
    if name.trim().is_empty() {
        return Err(anyhow!("add: habit name is required"));
    }

    let habit = store.add_habit(&name, now)?;
    println!("Created habit {} «{}».", habit.id, habit.name);
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_list(store: &mut DataStore, renderer: &mut Renderer, today: NaiveDate) -> anyhow::Result<()> {
    info!("command list");

    let habits = store.load_habits()?;
    if habits.is_empty() {
        println!("No habits yet. Create one with `habit add <name>`.");
        return Ok(());
    }

    let marks = store.marks_on(today)?;
    let rows: Vec<_> = habits
        .into_iter()
        .map(|habit| {
            let mark = marks.get(&habit.uuid).copied();
            (habit, mark)
        })
        .collect();

    renderer.print_habit_table(&rows, today)
}

#[instrument(skip(store, renderer, selectors, args))]
fn cmd_info(
    store: &mut DataStore,
    renderer: &mut Renderer,
    selectors: &[String],
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command info");

    let (selectors, _) = split_target(selectors, args);
    let habits = store.load_habits()?;
    let habit = select_habit(&habits, &selectors)?;

    let today_mark = store.mark_on(habit.uuid, today)?;
    let days_marked = store.status_map(habit.uuid)?.len();
    renderer.print_habit_info(habit, today_mark, days_marked)
}

#[instrument(skip(store, selectors, args, now))]
fn cmd_rename(
    store: &mut DataStore,
    selectors: &[String],
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command rename");

    let (selectors, rest) = split_target(selectors, args);
    let habits = store.load_habits()?;
    let habit = select_habit(&habits, &selectors)?;

    let new_name = plain_words(&rest).join(" ");
    if new_name.trim().is_empty() {
        return Err(anyhow!("rename: new name is required"));
    }

    let renamed = store.rename_habit(habit.uuid, &new_name, now)?;
    println!("Renamed habit {} to «{}».", renamed.id, renamed.name);
    Ok(())
}

#[instrument(skip(store, selectors, args))]
fn cmd_delete(store: &mut DataStore, selectors: &[String], args: &[String]) -> anyhow::Result<()> {
    info!("command delete");

    let (selectors, _) = split_target(selectors, args);
    let habits = store.load_habits()?;
    let habit = select_habit(&habits, &selectors)?;

    let removed = store.delete_habit(habit.uuid)?;
    println!("Deleted habit {} «{}».", removed.id, removed.name);
    Ok(())
}

#[instrument(skip(store, selectors, args, now))]
fn cmd_mark(
    store: &mut DataStore,
    selectors: &[String],
    args: &[String],
    mark: Mark,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(mark = mark.as_str(), "command mark");

    let (selectors, rest) = split_target(selectors, args);
    let habits = store.load_habits()?;
    let habit = select_habit(&habits, &selectors)?;

    let mut date = today;
    for one_mod in parse_mods(&rest, today)? {
        match one_mod {
            Mod::Date(value) => date = value,
            other => warn!(?other, "modifier ignored by done/cancel"),
        }
    }

    let previous = store.set_mark(habit.uuid, date, mark, now)?;
    if let Some(previous) = previous.filter(|p| *p != mark) {
        println!(
            "Habit {} «{}» on {date}: {} (was {}).",
            habit.id,
            habit.name,
            mark.as_str(),
            previous.as_str()
        );
    } else {
        println!(
            "Habit {} «{}» on {date}: {}.",
            habit.id,
            habit.name,
            mark.as_str()
        );
    }
    Ok(())
}

#[instrument(skip(store, cfg, selectors, args))]
fn cmd_view(
    store: &mut DataStore,
    cfg: &Config,
    selectors: &[String],
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command view");

    let (selectors, rest) = split_target(selectors, args);
    let habits = store.load_habits()?;
    let habit = select_habit(&habits, &selectors)?;
    let mods = parse_mods(&rest, today)?;

    let range = resolve_window(&mods, cfg.heatmap_days()?, today)?;
    let out = mods
        .iter()
        .rev()
        .find_map(|m| match m {
            Mod::Out(path) => Some(path.clone()),
            _ => None,
        })
        .unwrap_or_else(|| store.data_dir.join(format!("heatmap-{}.png", habit.id)));
    let title = match mods.iter().rev().find_map(|m| match m {
        Mod::Title(title) => Some(title.clone()),
        _ => None,
    }) {
        Some(TitleMod::Off) => None,
        Some(TitleMod::Text(text)) => Some(text),
        None => cfg.heatmap_title().then(|| habit.name.clone()),
    };

    let statuses = store.status_map(habit.uuid)?;
    let grid = grid::build(&statuses, range.start(), range.end())
        .with_context(|| format!("failed to lay out heatmap for habit {}", habit.id))?;
    let png = HeatmapRenderer::new(cfg.heatmap_style()?)
        .render(&grid, &cfg.labels()?, title.as_deref())
        .with_context(|| format!("failed to render heatmap for habit {}", habit.id))?;

    fs::write(&out, &png).with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "Wrote {} ({} to {}, {} week(s), {} day(s) done).",
        out.display(),
        range.start(),
        range.end(),
        grid.num_weeks(),
        grid.done_count()
    );
    Ok(())
}

#[instrument(skip(store))]
fn cmd_remind(store: &mut DataStore, today: NaiveDate) -> anyhow::Result<()> {
    info!("command remind");

    let marks = store.marks_on(today)?;
    let mut pending = 0_usize;
    for habit in store.load_habits()? {
        if marks.contains_key(&habit.uuid) {
            continue;
        }
        pending += 1;
        println!(
            "⏰ Habit «{}» for {today}: `habit {id} done` or `habit {id} cancel`",
            habit.name,
            id = habit.id
        );
    }

    if pending == 0 {
        println!("Nothing to remind: every habit is marked for {today}.");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: add <name>, list, info, rename <name>, delete, done [date:<expr>], \
         cancel [date:<expr>], view [days:N] [from:<expr>] [to:<expr>] [out:<path>] \
         [title:<text>|title:off], remind, _show, version\n\
         Select a habit by id, uuid or name before the command (`habit 2 done`) \
         or as its first argument (`habit done 2`)."
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TitleMod {
    Off,
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Date(NaiveDate),
    From(NaiveDate),
    To(NaiveDate),
    Days(u32),
    Out(PathBuf),
    Title(TitleMod),
}

/// Uses the selectors given before the command, or else the command's first
/// argument when it is not a modifier.
fn split_target(selectors: &[String], args: &[String]) -> (Vec<String>, Vec<String>) {
    if !selectors.is_empty() {
        return (selectors.to_vec(), args.to_vec());
    }
    match args.split_first() {
        Some((first, rest)) if !looks_like_mod(first) => (vec![first.clone()], rest.to_vec()),
        _ => (vec![], args.to_vec()),
    }
}

fn looks_like_mod(tok: &str) -> bool {
    tok.split_once(':')
        .or_else(|| tok.split_once('='))
        .is_some_and(|(key, _)| is_mod_key(key))
}

fn is_mod_key(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "date" | "from" | "to" | "days" | "out" | "title"
    )
}

fn select_habit<'a>(habits: &'a [Habit], selectors: &[String]) -> anyhow::Result<&'a Habit> {
    let selector = selectors.join(" ");
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(anyhow!("no habit selected; give an id, uuid or name"));
    }

    let found = if let Ok(id) = selector.parse::<u64>() {
        habits.iter().find(|h| h.id == id)
    } else if let Ok(uuid) = uuid::Uuid::parse_str(selector) {
        habits.iter().find(|h| h.uuid == uuid)
    } else {
        let lower = selector.to_lowercase();
        habits.iter().find(|h| h.name.to_lowercase() == lower)
    };

    found.ok_or_else(|| anyhow!("no habit matches '{selector}'"))
}

/// Words that are not modifiers; everything after `--` is taken literally.
fn plain_words(args: &[String]) -> Vec<String> {
    let mut words = Vec::with_capacity(args.len());
    let mut literal = false;
    for arg in args {
        if literal {
            words.push(arg.clone());
        } else if arg == "--" {
            literal = true;
        } else if looks_like_mod(arg) {
            warn!(arg = %arg, "modifier ignored in habit name");
        } else {
            words.push(arg.clone());
        }
    }
    words
}

#[instrument(skip(args, today))]
fn parse_mods(args: &[String], today: NaiveDate) -> anyhow::Result<Vec<Mod>> {
    let mut mods = Vec::new();
    for arg in args {
        if let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
        } else {
            warn!(arg = %arg, "unrecognized modifier token ignored");
        }
    }
    Ok(mods)
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    let (key, value) = if let Some((k, v)) = tok.split_once(':') {
        (k, v)
    } else if let Some((k, v)) = tok.split_once('=') {
        (k, v)
    } else {
        return Ok(None);
    };

    let key = key.to_ascii_lowercase();

    match key.as_str() {
        "date" => Ok(Some(Mod::Date(parse_date_expr(value, today)?))),
        "from" => Ok(Some(Mod::From(parse_date_expr(value, today)?))),
        "to" => Ok(Some(Mod::To(parse_date_expr(value, today)?))),
        "days" => {
            let days = value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("days: expected a whole number, got '{value}'"))?;
            Ok(Some(Mod::Days(days)))
        }
        "out" => Ok(Some(Mod::Out(PathBuf::from(value)))),
        "title" => {
            let title = match value.trim().to_ascii_lowercase().as_str() {
                "" | "off" | "none" => TitleMod::Off,
                _ => TitleMod::Text(value.to_string()),
            };
            Ok(Some(Mod::Title(title)))
        }
        _ => Ok(None),
    }
}

/// `to` defaults to today; `from` defaults to `days` before `to`.
fn resolve_window(mods: &[Mod], default_days: u32, today: NaiveDate) -> anyhow::Result<DateRange> {
    let mut from = None;
    let mut to = None;
    let mut days = default_days;

    for one_mod in mods {
        match one_mod {
            Mod::From(date) => from = Some(*date),
            Mod::To(date) => to = Some(*date),
            Mod::Days(value) => days = *value,
            _ => {}
        }
    }

    let end = to.unwrap_or(today);
    let range = match from {
        Some(start) => DateRange::new(start, end)?,
        None => DateRange::trailing(end, days)?,
    };
    Ok(range)
}
