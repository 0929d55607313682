use std::{
    error::Error,
    io::{self, Write},
};

use clap::Parser;
use tally::{
    Client, parse_values,
    protocol::{ComputeStatus, FetchReply, MAX_ARRAY_LEN},
    prompt, prompt_number, render_reply,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:8080")]
    address: String,
    /// Worker count used for every `--array`
    #[arg(long, default_value_t = 1)]
    workers: u32,
    /// Comma-separated values of one array; repeat for more arrays.
    /// Prompts interactively when omitted.
    #[arg(long = "array")]
    arrays: Vec<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let jobs = if cli.arrays.is_empty() {
        read_jobs()?
    } else {
        cli.arrays
            .iter()
            .map(|s| Ok((parse_values(s)?, cli.workers)))
            .collect::<Result<Vec<_>, Box<dyn Error>>>()?
    };

    let mut client = Client::connect(cli.address.as_str())?;
    for (values, workers) in &jobs {
        client.submit_array(values, *workers)?;
    }

    match client.compute()? {
        ComputeStatus::Ok => {}
        ComputeStatus::NoData => return Err("server reports no data submitted".into()),
        ComputeStatus::Rejected => {
            return Err("server rejected the requested worker counts".into());
        }
    }

    let reply = client.fetch_results()?;
    print!("{}", render_reply(&reply));
    io::stdout().flush()?;

    match reply {
        FetchReply::Done(_) => Ok(()),
        _ => Err("results not available".into()),
    }
}

/// Asks the user for every array and its worker count.
fn read_jobs() -> Result<Vec<(Vec<i32>, u32)>, Box<dyn Error>> {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    let count = prompt_number(&mut stdin, &mut stdout, "Enter number of arrays to send: ")?;
    let mut jobs = Vec::new();

    for i in 1..=count {
        let values = loop {
            let line = prompt(
                &mut stdin,
                &mut stdout,
                &format!("Enter values for array {i} (max {MAX_ARRAY_LEN}): "),
            )?;
            match parse_values(&line) {
                Ok(v) if !v.is_empty() && v.len() <= MAX_ARRAY_LEN => break v,
                Ok(v) => writeln!(stdout, "invalid array size {}", v.len())?,
                Err(e) => writeln!(stdout, "{e}")?,
            }
        };
        let workers = prompt_number(
            &mut stdin,
            &mut stdout,
            &format!("Enter number of threads for array {i}: "),
        )?;
        jobs.push((values, workers));
    }

    Ok(jobs)
}
