// Entry point and high-level CLI flow.
//
// `run` processes the given inputs in one go. Without a subcommand an
// interactive menu is shown instead:
// - Option [1] loads, validates, deduplicates and enriches the inputs,
//   printing diagnostics.
// - Option [2] computes every view, writes them out and previews them.
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use traffic_report::loader::load_and_validate;
use traffic_report::output::preview_table;
use traffic_report::pipeline::{self, AnalysisResults, RunReport};
use traffic_report::types::EnrichedIncident;
use traffic_report::util::{format_int, format_number};
use traffic_report::{CsvDirSink, PipelineConfig, PipelineError};

#[derive(Parser)]
#[command(name = "traffic_report", about = "Traffic incident batch analytics")]
struct Cli {
    /// TOML file overriding thresholds and hotspot passes
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory receiving the views
    #[arg(long, global = true, default_value = "output")]
    output: PathBuf,
    /// Rows of each view to print after the run
    #[arg(long, global = true, default_value = "5")]
    preview: usize,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process incident exports (files or directories of *.csv) in one batch
    Run {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

// Loaded dataset kept between menu choices so the inputs are read once but
// reports can be regenerated.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<(Vec<EnrichedIncident>, RunReport)>,
}

// None at end of input or on a read error.
fn next_line<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    next_line(&mut io::stdin().lock())
}

fn print_previews(results: &AnalysisResults, rows: usize) {
    preview_table("Incidents by comuna", &results.by_comuna, rows);
    preview_table("Incidents by type", &results.by_type, rows);
    preview_table("Incidents by hour", &results.by_hour, 24);
    preview_table("Incidents by day", &results.by_day, rows);
    preview_table("Comuna x type", &results.comuna_type, rows);
    preview_table("Comuna x type x hour", &results.comuna_type_hour, rows);
    preview_table("Severity distribution", &results.severity_distribution, 3);
    preview_table("Traffic hotspots", &results.hotspots, rows);
    preview_table("Traffic hotspots (coarse)", &results.hotspots_coarse, rows);
    preview_table("Risk ranking", &results.risk_ranking, rows);
    preview_table("Safety index", &results.safety_index, rows);
    if let Some(summary) = &results.summary {
        preview_table("Summary", std::slice::from_ref(summary), 1);
    }
}

fn print_report(report: &RunReport) {
    println!(
        "Processing dataset... ({} rows read from {} file(s), {} retained, {} dropped)",
        format_int(report.total_rows),
        report.files,
        format_int(report.retained),
        format_int(report.dropped)
    );
    println!(
        "Note: {} duplicate rows collapsed, {} records enriched ({}% of input).",
        format_int(report.duplicates),
        format_int(report.enriched),
        format_number(report.filter_rate, 2)
    );
    if report.out_of_range_severity > 0 {
        println!(
            "Warning: {} records have severity outside 0-10.",
            format_int(report.out_of_range_severity)
        );
    }
    println!();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, PipelineError> {
    match path {
        Some(p) => Ok(PipelineConfig::load(p)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn run_batch(inputs: &[PathBuf], cli: &Cli, cfg: &PipelineConfig) -> Result<(), PipelineError> {
    let mut sink = CsvDirSink::new(&cli.output, cfg.write_headers);
    let (results, report) = pipeline::run(inputs, cfg, &mut sink)?;
    print_report(&report);
    print_previews(&results, cli.preview);
    println!("(Full views exported under {})", sink.root().display());
    Ok(())
}

fn handle_load(cfg: &PipelineConfig) {
    let Some(line) = read_line("Input files or directories (space separated): ") else {
        return;
    };
    let inputs: Vec<PathBuf> = line.split_whitespace().map(PathBuf::from).collect();
    match load_and_validate(&inputs, cfg) {
        Ok((records, load)) => {
            let (data, report) = pipeline::prepare(records, &load, cfg);
            print_report(&report);
            let mut state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
            state.data = Some((data, report));
        }
        Err(e) => {
            eprintln!("Failed to load input: {}\n", e);
        }
    }
}

fn handle_generate_reports(cli: &Cli, cfg: &PipelineConfig) {
    let loaded = {
        let state = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
        state.data.clone()
    };
    let Some((data, mut report)) = loaded else {
        println!("Error: No data loaded. Please load the input first (option 1).\n");
        return;
    };

    println!("Generating reports...\n");
    let mut sink = CsvDirSink::new(&cli.output, cfg.write_headers);
    let results = match pipeline::analyze_and_emit(&data, &mut report, cfg, &mut sink, Instant::now()) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Write error: {}", e);
            return;
        }
    };
    print_previews(&results, cli.preview);
    println!("(Full views exported under {})\n", sink.root().display());
}

fn interactive(cli: &Cli, cfg: &PipelineConfig) {
    loop {
        println!("Traffic Incident Analytics");
        println!("[1] Load input");
        println!("[2] Generate reports");
        println!("[3] Exit\n");
        let Some(choice) = read_line("Enter choice: ") else {
            println!("Exiting the program.");
            break;
        };
        match choice.as_str() {
            "1" => handle_load(cfg),
            "2" => handle_generate_reports(cli, cfg),
            "3" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 1, 2 or 3.\n"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match &cli.command {
        Some(Commands::Run { inputs }) => run_batch(inputs, &cli, &cfg)?,
        None => interactive(&cli, &cfg),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_input_ends_the_menu() {
        let mut input = io::Cursor::new("2\n\n");
        assert_eq!(next_line(&mut input).as_deref(), Some("2"));
        assert_eq!(next_line(&mut input).as_deref(), Some(""));
        assert_eq!(next_line(&mut input), None);
    }
}
