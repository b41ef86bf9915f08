use anyhow::{anyhow, bail, Result};
use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use kminhash::serialization::MAX_DESERIALIZE_CAPACITY;
use kminhash::sketch_schemes::SketchParams;
use std::str::FromStr;

pub fn build_cli() -> App<'static, 'static> {
    App::new("kmh")
        .version(crate_version!())
        .about("Tool for building, merging and inspecting k-minimum-values MinHash sketches")
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::ArgRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .global(true)
                .help("Log more to stderr (-v for debug, -vv for trace)"),
        )
        .subcommand(create_command())
        .subcommand(add_command())
        .subcommand(merge_command())
        .subcommand(cardinality_command())
        .subcommand(dist_command())
        .subcommand(info_command())
}

fn create_command() -> App<'static, 'static> {
    let mut create_command = SubCommand::with_name("create")
        .about("Create a sketch from integer values; anything else is ignored")
        .setting(AppSettings::AllowNegativeNumbers)
        .arg(
            Arg::with_name("VALUES")
                .help("The values to insert")
                .multiple(true),
        );
    create_command = add_output_options(create_command);
    create_command = add_sketch_options(create_command);
    create_command
}

fn add_command() -> App<'static, 'static> {
    let add_command = SubCommand::with_name("add")
        .about("Insert one value into an existing sketch")
        .setting(AppSettings::AllowNegativeNumbers)
        .arg(
            Arg::with_name("INPUT")
                .help("The sketch file to add to")
                .required(true),
        )
        .arg(
            Arg::with_name("VALUE")
                .help("The integer to insert")
                .required(true),
        );
    add_output_options(add_command)
}

fn merge_command() -> App<'static, 'static> {
    let merge_command = SubCommand::with_name("merge")
        .about("Merge compatible sketches into one")
        .arg(
            Arg::with_name("INPUT")
                .help("The sketch file(s) to merge")
                .multiple(true)
                .required(true),
        );
    add_output_options(merge_command)
}

fn cardinality_command() -> App<'static, 'static> {
    SubCommand::with_name("cardinality")
        .about("Estimate the number of distinct values in each sketch")
        .arg(
            Arg::with_name("INPUT")
                .help("Estimate for these file(s)")
                .multiple(true)
                .required(true),
        )
}

fn dist_command() -> App<'static, 'static> {
    SubCommand::with_name("dist")
        .about("Compute the Jaccard distance between two sketches")
        .arg(
            Arg::with_name("QUERY")
                .help("The first sketch file")
                .required(true),
        )
        .arg(
            Arg::with_name("REFERENCE")
                .help("The second sketch file")
                .required(true),
        )
}

fn info_command() -> App<'static, 'static> {
    SubCommand::with_name("info")
        .about("Display sketch parameters and digests as JSON")
        .arg(
            Arg::with_name("INPUT")
                .help("Return info on these file(s)")
                .multiple(true)
                .required(true),
        )
}

fn add_sketch_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(Arg::with_name("capacity")
         .short("k")
         .long("capacity")
         .takes_value(true)
         .default_value("400")
         .help("How many digests the sketch retains"))
    .arg(Arg::with_name("space_size")
         .long("space-size")
         .takes_value(true)
         .default_value("4294967295")
         .help("Digests are hashes reduced modulo this value"))
    .arg(Arg::with_name("seed")
         .long("seed")
         .takes_value(true)
         .default_value("42")
         .help("Seed the hash function with this value"))
}

fn add_output_options<'a, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
    app.arg(
        Arg::with_name("output_file")
            .short("o")
            .long("output")
            .help("Output to this file")
            .takes_value(true),
    )
    .arg(
        Arg::with_name("std_out")
            .short("O")
            .long("std-out")
            .help("Output to stdout ('print to terminal')")
            .conflicts_with("output_file"),
    )
    .arg(
        Arg::with_name("json_format")
            .short("j")
            .long("json")
            .help("Output the sketch as JSON instead of the binary format"),
    )
}

pub fn get_int_arg<T: FromStr>(matches: &ArgMatches, key: &str) -> Result<T> {
    let display_key = key.replace('_', "-");
    matches
        .value_of(key)
        .ok_or_else(|| anyhow!("Bad {}", display_key))?
        .parse::<T>()
        .map_err(|_| anyhow!("{} must be a positive integer", display_key))
}

pub fn parse_sketch_options(matches: &ArgMatches) -> Result<SketchParams> {
    let params = SketchParams::new(
        get_int_arg(matches, "capacity")?,
        get_int_arg(matches, "space_size")?,
        get_int_arg(matches, "seed")?,
    );
    params.validate()?;
    // sketches above this can't be read back
    if params.capacity > MAX_DESERIALIZE_CAPACITY {
        bail!(
            "capacity must be at most {}, got {}",
            MAX_DESERIALIZE_CAPACITY,
            params.capacity
        );
    }
    Ok(params)
}
