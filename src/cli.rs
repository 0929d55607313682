//! CLI utilities for Tally.
//!
//! The utilities present in this module back the interactive client: reading
//! arrays and worker counts from a user and printing fetched results.
use std::{
    fmt::Write as _,
    io::{self, BufRead, Write},
};

use thiserror::Error;

use crate::protocol::FetchReply;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("console IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid input '{input}', {reason}")]
    Parse { input: String, reason: String },
    #[error("no more input")]
    EndOfInput,
}

/// Writes `message`, then reads one trimmed line from `reader`.
pub fn prompt<R, W>(mut reader: R, mut writer: W, message: &str) -> Result<String, CliError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "{message}")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Err(CliError::EndOfInput);
    }
    Ok(s.trim().to_string())
}

/// Prompts until the user gives a non-negative integer.
pub fn prompt_number<R, W>(mut reader: R, mut writer: W, message: &str) -> Result<u32, CliError>
where
    R: BufRead,
    W: Write,
{
    loop {
        let line = prompt(&mut reader, &mut writer, message)?;
        match line.parse::<u32>() {
            Ok(n) => return Ok(n),
            Err(_) => writeln!(&mut writer, "'{line}' is not a non-negative integer")?,
        }
    }
}

/// Parses integers separated by commas and/or whitespace.
pub fn parse_values(s: &str) -> Result<Vec<i32>, CliError> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i32>().map_err(|e| CliError::Parse {
                input: part.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Plain-text rendering of a FetchResults reply.
pub fn render_reply(reply: &FetchReply) -> String {
    match reply {
        FetchReply::Done(results) => {
            let mut out = String::new();
            for (i, summary) in results.iter().enumerate() {
                let mode = summary
                    .mode
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                let _ = writeln!(out, "Results for array {}:", i + 1);
                let _ = writeln!(out, "Mode: {mode}");
                let _ = writeln!(out, "Median: {}", summary.median);
            }
            out
        }
        FetchReply::InProgress => "Computation in progress\n".to_string(),
        FetchReply::NoData => "No data submitted\n".to_string(),
    }
}
