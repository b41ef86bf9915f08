use std::collections::HashMap;
use std::fs::File;
use std::io::{stdout, Write};

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::parse_sketch_options;
use kminhash::distance::distance;
use kminhash::host::HostValue;
use kminhash::merge::merge_many;
use kminhash::serialization::{deserialize, to_bytes, JsonSketch, JSON_EXT, KMH_EXT};
use kminhash::{open_sketch_file, Engine, KmvSketch};

mod cli;

fn output_to<F>(output_fn: F, output: Option<&str>, extension: &str) -> Result<()>
where
    F: Fn(&mut dyn Write) -> Result<()>,
{
    match output {
        None => {
            let mut out = stdout();
            output_fn(&mut out)?;
        }
        Some(o) => {
            // if the filename doesn't have the right extension
            // add it on
            let filename = String::from(o);
            let out_filename = if filename.ends_with(extension) {
                filename
            } else {
                filename + extension
            };

            let mut out = File::create(&out_filename)
                .context(format!("unable to create '{}'", out_filename))?;
            output_fn(&mut out)?;
        }
    };
    Ok(())
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let verbosity = matches
        .subcommand()
        .1
        .map_or(0, |m| m.occurrences_of("verbose"))
        .max(matches.occurrences_of("verbose"));
    init_logging(verbosity);

    match matches.subcommand() {
        ("create", Some(matches)) => {
            let engine = Engine::default().with_params(parse_sketch_options(matches)?)?;
            let values: Vec<HostValue> = matches
                .values_of("VALUES")
                .map(|values| values.map(parse_host_value).collect())
                .unwrap_or_default();
            let bytes = engine
                .create(&values)?
                .ok_or_else(|| anyhow!("Could not create a sketch"))?;
            emit_sketch(matches, &engine, &bytes)?;
        }
        ("add", Some(matches)) => {
            let engine = Engine::default();
            let filename = matches.value_of("INPUT").ok_or_else(|| anyhow!("Bad INPUT"))?;
            let value = matches.value_of("VALUE").ok_or_else(|| anyhow!("Bad VALUE"))?;
            let blob = read_blob(filename, &engine)?;
            let bytes = engine
                .add(&HostValue::Blob(&blob), &parse_host_value(value))?
                .ok_or_else(|| anyhow!("{} is not a valid sketch", filename))?;
            emit_sketch(matches, &engine, &bytes)?;
        }
        ("merge", Some(matches)) => {
            let engine = Engine::default();
            let sketches = open_sketch_files(matches, &engine)?;
            let merged = merge_many(&sketches, engine.pools())
                .ok_or_else(|| anyhow!("No sketches present!"))?
                .context("Unable to merge sketches")?;
            let bytes = to_bytes(&merged, engine.pools())?;
            emit_sketch(matches, &engine, &bytes)?;
        }
        ("cardinality", Some(matches)) => {
            let engine = Engine::default();
            let mut estimates: HashMap<String, f64> = HashMap::new();
            for filename in input_filenames(matches)? {
                let blob = read_blob(filename, &engine)?;
                let estimate = engine
                    .cardinality(&HostValue::Blob(&blob))?
                    .ok_or_else(|| anyhow!("{} is not a valid sketch", filename))?;
                estimates.insert(filename.to_string(), estimate);
            }

            output_to(
                |writer| {
                    serde_json::to_writer(writer, &estimates)
                        .map_err(|_| anyhow!("Could not serialize JSON to file"))?;
                    Ok(())
                },
                None,
                JSON_EXT,
            )?;
        }
        ("dist", Some(matches)) => {
            let engine = Engine::default();
            let open = |key: &str| -> Result<KmvSketch> {
                let filename = matches
                    .value_of(key)
                    .ok_or_else(|| anyhow!("Bad {}", key))?;
                open_sketch_file(filename, engine.pools())
                    .with_context(|| format!("Unable to read {}", filename))
            };
            let query = open("QUERY")?;
            let reference = open("REFERENCE")?;
            let report = distance(&query, &reference)?;

            output_to(
                |writer| {
                    serde_json::to_writer(writer, &report)
                        .map_err(|_| anyhow!("Could not serialize JSON to file"))?;
                    Ok(())
                },
                None,
                JSON_EXT,
            )?;
        }
        ("info", Some(matches)) => {
            let engine = Engine::default();
            let filenames = input_filenames(matches)?;
            let sketches = open_sketch_files(matches, &engine)?;
            let info: Vec<JsonSketch> = filenames
                .iter()
                .zip(&sketches)
                .map(|(filename, sketch)| JsonSketch::new(filename, sketch))
                .collect();

            output_to(
                |writer| {
                    serde_json::to_writer(writer, &info)
                        .map_err(|_| anyhow!("Could not serialize JSON to file"))?;
                    Ok(())
                },
                None,
                JSON_EXT,
            )?;
        }
        other => bail!("Unknown subcommand: {:?}", other.0),
    };

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}

/// Arguments that don't parse as integers are passed through as text, which
/// sketch primitives ignore.
fn parse_host_value(arg: &str) -> HostValue<'_> {
    match arg.parse::<i64>() {
        Ok(value) => HostValue::Integer(value),
        Err(_) => {
            debug!(arg, "ignoring non-integer value");
            HostValue::Text(arg)
        }
    }
}

fn input_filenames<'a>(matches: &'a ArgMatches) -> Result<Vec<&'a str>> {
    Ok(matches
        .values_of("INPUT")
        .ok_or_else(|| anyhow!("Bad INPUT"))?
        .collect())
}

fn open_sketch_files(matches: &ArgMatches, engine: &Engine) -> Result<Vec<KmvSketch>> {
    input_filenames(matches)?
        .into_iter()
        .map(|filename| {
            open_sketch_file(filename, engine.pools())
                .with_context(|| format!("Unable to read {}", filename))
        })
        .collect()
}

/// Binary sketch files are handed over untouched; JSON ones are encoded first.
fn read_blob(filename: &str, engine: &Engine) -> Result<Vec<u8>> {
    if filename.ends_with(KMH_EXT) {
        std::fs::read(filename).with_context(|| format!("Error opening {}", filename))
    } else {
        let sketch = open_sketch_file(filename, engine.pools())
            .with_context(|| format!("Unable to read {}", filename))?;
        Ok(to_bytes(&sketch, engine.pools())?)
    }
}

fn emit_sketch(matches: &ArgMatches, engine: &Engine, bytes: &[u8]) -> Result<()> {
    if !matches.is_present("output_file") && !matches.is_present("std_out") {
        bail!("Specify an output file with -o or write to stdout with -O");
    }
    let output = matches.value_of("output_file");

    if matches.is_present("json_format") {
        let sketch = deserialize(bytes, engine.pools())?;
        let json = JsonSketch::new(output.unwrap_or(""), &sketch);
        output_to(
            |writer| {
                serde_json::to_writer(writer, &json)?;
                Ok(())
            },
            output,
            JSON_EXT,
        )
    } else {
        output_to(
            |writer| {
                writer.write_all(bytes)?;
                Ok(())
            },
            output,
            KMH_EXT,
        )
    }
}
