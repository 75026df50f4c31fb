/// `ds stress`: concurrent load against a scratch table.
///
/// Every worker picks at random between adding a record, deleting its last
/// record, adding under a shared index value, moving its last record to a
/// new unique value, adding an oversized record and reading the shared index
/// sorted. Writers and readers contend for the table lock the whole time.
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use engine::{GetOptions, Options, Record, Table};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::env_or;

const USAGE: &str = "\
Usage: ds stress [options]

Options:
  -w, --work-dir DIR    Directory for the scratch table (default: temp dir)
  -t, --threads N       Worker threads (default: 4)
  -n, --count N         Operations across all threads (default: 10000)
  -h, --help            Print this help
";

#[derive(Debug, Clone, Serialize, Deserialize, Record)]
struct Sample {
    #[ds(primary)]
    primary: String,
    #[ds(index)]
    index: String,
    #[ds(unique)]
    unique: String,
    nested: Nested,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Nested {
    foo: String,
    bar: Vec<String>,
}

const FIELD_LEN: usize = 258;
const RNG_SEED: u64 = 7;

fn gen_string(rng: &mut fastrand::Rng, len: usize) -> String {
    std::iter::repeat_with(|| rng.alphanumeric()).take(len).collect()
}

impl Sample {
    /// A record with random contents. `len` picks the length of each string.
    fn random(
        rng: &mut fastrand::Rng,
        index: Option<&str>,
        len: impl Fn(&mut fastrand::Rng) -> usize,
    ) -> Self {
        let field = |rng: &mut fastrand::Rng| {
            let n = len(rng);
            gen_string(rng, n)
        };
        Self {
            primary: field(rng),
            index: match index {
                Some(index) => index.to_string(),
                None => field(rng),
            },
            unique: field(rng),
            nested: Nested {
                foo: field(rng),
                bar: vec![field(rng)],
            },
        }
    }
}

struct Settings {
    work_dir: Option<PathBuf>,
    threads: usize,
    count: usize,
}

fn parse_number(flag: &str, value: Option<&String>) -> Result<usize> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("{flag}: '{value}' is not a number"))
}

/// Returns `None` when help was requested.
fn parse(args: &[String]) -> Result<Option<Settings>> {
    let work_dir = env_or("DS_STRESS_WORK_DIR", "");
    let mut settings = Settings {
        work_dir: (!work_dir.is_empty()).then(|| PathBuf::from(work_dir)),
        threads: env_or("DS_STRESS_THREADS", "4").parse().unwrap_or(4),
        count: env_or("DS_STRESS_COUNT", "10000").parse().unwrap_or(10_000),
    };

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-w" | "--work-dir" => {
                let dir = args.next().with_context(|| format!("{arg} needs a value"))?;
                settings.work_dir = Some(PathBuf::from(dir));
            }
            "-t" | "--threads" => settings.threads = parse_number(arg, args.next())?,
            "-n" | "--count" => settings.count = parse_number(arg, args.next())?,
            "-h" | "--help" => {
                print!("{USAGE}");
                return Ok(None);
            }
            other => bail!("unknown option '{other}'\n\n{USAGE}"),
        }
    }

    if settings.threads == 0 {
        bail!("--threads must be at least 1");
    }
    Ok(Some(settings))
}

/// Runs `ops` randomly chosen operations for one worker and returns how
/// many it completed.
fn work(table: &Table<Sample>, worker: usize, ops: usize) -> Result<usize> {
    let mut rng = fastrand::Rng::with_seed(RNG_SEED + worker as u64);
    let shared = gen_string(&mut rng, FIELD_LEN);
    let mut last: Option<Sample> = None;

    for _ in 0..ops {
        match rng.u8(0..6) {
            0 => {
                let sample = Sample::random(&mut rng, None, |_| FIELD_LEN);
                table.start_write(|tx| tx.add(&sample))?;
                last = Some(sample);
            }
            1 => {
                if let Some(sample) = last.take() {
                    table.start_write(|tx| tx.delete(&sample))?;
                }
            }
            2 => {
                let sample = Sample::random(&mut rng, Some(&shared), |_| FIELD_LEN);
                table.start_write(|tx| tx.add(&sample))?;
                last = Some(sample);
            }
            3 => {
                if let Some(sample) = last.as_mut() {
                    sample.unique = gen_string(&mut rng, FIELD_LEN);
                    table.start_write(|tx| tx.update(sample))?;
                }
            }
            4 => {
                let sample = Sample::random(&mut rng, None, |rng| rng.usize(1000..10_000));
                table.start_write(|tx| tx.add(&sample))?;
                last = Some(sample);
            }
            _ => {
                table.start_read(|tx| {
                    tx.get_index("index", &shared, GetOptions::sorted(true).max(10))
                })?;
            }
        }
    }
    Ok(ops)
}

pub fn run(args: &[String]) -> Result<()> {
    let Some(settings) = parse(args)? else {
        return Ok(());
    };

    let (work_dir, scratch) = match settings.work_dir {
        Some(dir) => (dir, false),
        None => (
            std::env::temp_dir().join(format!("ds-stress-{}", std::process::id())),
            true,
        ),
    };
    fs::create_dir_all(&work_dir)?;
    let table_path = work_dir.join(format!("stress-{}.db", std::process::id()));
    println!(
        "table_path='{}' threads={} count={}",
        table_path.display(),
        settings.threads,
        settings.count
    );

    let table = Arc::new(Table::<Sample>::register(&table_path, Options::default())?);
    let per_thread = settings.count / settings.threads;

    let started = Instant::now();
    let handles: Vec<_> = (0..settings.threads)
        .map(|worker| {
            let table = Arc::clone(&table);
            thread::spawn(move || work(&table, worker, per_thread))
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        completed += handle
            .join()
            .map_err(|_| anyhow!("stress worker panicked"))??;
    }
    let elapsed = started.elapsed();

    let remaining = table.start_read(|tx| tx.get_all(GetOptions::default()))?.len();
    table.close();

    let rate = completed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!("completed {completed} operations in {elapsed:.2?} ({rate:.0} ops/s)");
    println!("records remaining: {remaining}");
    info!(completed, remaining, "stress run finished");

    if scratch {
        fs::remove_dir_all(&work_dir)?;
    } else {
        fs::remove_file(&table_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_sample_uses_shared_index_and_lengths() {
        let mut rng = fastrand::Rng::with_seed(1);
        let sample = Sample::random(&mut rng, Some("shared"), |_| 12);
        assert_eq!(sample.index, "shared");
        assert_eq!(sample.primary.len(), 12);
        assert_eq!(sample.unique.len(), 12);
        assert!(sample.primary.chars().all(|c| c.is_ascii_alphanumeric()));

        let large = Sample::random(&mut rng, None, |rng| rng.usize(1000..10_000));
        assert!((1000..10_000).contains(&large.nested.foo.len()));
        assert_ne!(large.index, "shared");
    }

    #[test]
    fn work_runs_every_operation_against_a_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = Table::<Sample>::register(dir.path().join("t.db"), Options::default())?;
        assert_eq!(work(&table, 0, 60)?, 60);
        assert_eq!(work(&table, 1, 60)?, 60);
        table.close();
        Ok(())
    }
}
