use clap::{ArgAction, CommandFactory, Parser};
use blendsplit::explode::{explode_file, ExplodeOptions, DEFAULT_INLINE_LIMIT};
use blendsplit::implode::{implode_file, ImplodeOptions};
use std::path::{Path, PathBuf};
use std::process;

const EXIT_USAGE:   i32 = 1;
const EXIT_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(
    name = "blendsplit",
    about = "Explode a BLENDER container into a JSON manifest plus sidecar files, or implode it back",
    disable_help_flag = true
)]
struct Cli {
    /// Treat the input as a manifest and rebuild the container
    #[arg(short, long)]
    implode: bool,
    /// Container to write when imploding (default: <manifest>.blend.tmp)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Largest payload, in bytes, embedded in the manifest when exploding
    #[arg(long, default_value_t = DEFAULT_INLINE_LIMIT)]
    inline_limit: usize,
    /// Print this help
    #[arg(short, long, action = ArgAction::SetTrue)]
    help: bool,
    /// Container to explode, or manifest to implode with -i
    input: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(EXIT_USAGE);
        }
    };

    let input = match (&cli.input, cli.help) {
        (Some(input), false) => input.clone(),
        _ => {
            let _ = Cli::command().print_help();
            process::exit(EXIT_USAGE);
        }
    };

    if let Err(e) = run(&cli, &input) {
        eprintln!("blendsplit: {e}");
        process::exit(EXIT_FAILURE);
    }
    println!("Done");
}

fn run(cli: &Cli, input: &Path) -> blendsplit::Result<()> {
    if cli.implode {
        let opts = ImplodeOptions { output: cli.output.clone(), ..ImplodeOptions::default() };
        let report = implode_file(input, &opts)?;
        println!("  rebuilt {} records -> {}", report.records, report.output.display());
    } else {
        if let Some(output) = &cli.output {
            log::warn!("--output {} is ignored when exploding", output.display());
        }
        let opts = ExplodeOptions { inline_limit: cli.inline_limit, ..ExplodeOptions::default() };
        let report = explode_file(input, &opts)?;
        println!(
            "  {} records: {} inline, {} in {}",
            report.stats.records,
            report.stats.inlined,
            report.stats.externalized,
            report.sidecar_dir.display(),
        );
        println!("  manifest -> {}", report.manifest_path.display());
    }
    Ok(())
}
