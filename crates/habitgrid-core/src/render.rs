use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::habit::{Habit, Mark};

/// Terminal output for tables and habit details.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_habit_table(
        &mut self,
        rows: &[(Habit, Option<Mark>)],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Habit".to_string(), today.to_string()];
        let rows = rows
            .iter()
            .map(|(habit, mark)| {
                vec![
                    self.paint(&habit.id.to_string(), "33"),
                    habit.name.clone(),
                    self.mark_cell(*mark),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, habit))]
    pub fn print_habit_info(
        &mut self,
        habit: &Habit,
        today_mark: Option<Mark>,
        days_marked: usize,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", habit.id)?;
        writeln!(out, "uuid      {}", habit.uuid)?;
        writeln!(out, "name      {}", habit.name)?;
        writeln!(out, "today     {}", self.mark_cell(today_mark))?;
        writeln!(out, "marked    {days_marked} day(s)")?;
        writeln!(out, "entry     {}", habit.entry.format("%Y%m%dT%H%M%SZ"))?;
        writeln!(out, "modified  {}", habit.modified.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    fn mark_cell(&self, mark: Option<Mark>) -> String {
        match mark {
            Some(Mark::Done) => self.paint("done", "32"),
            Some(Mark::Cancel) => self.paint("cancel", "31"),
            None => "-".to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
