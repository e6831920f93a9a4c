mod debug_report;

use env_logger::Env;
use kandybars::{Engine, FsLoader, Loaded, RenderOptions, Value};
use std::io::{self, IsTerminal, Read};
use std::path::Path;

const DOCUMENT: &str = "document";

fn main() {
    env_logger::Builder::from_env(Env::new().filter_or("KANDYBARS_LOG", "warn")).init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(config: &CliConfig) -> kandybars::Result<()> {
    let data = match &config.data {
        Some(raw) => Value::from(serde_json::from_str::<serde_json::Value>(raw)?),
        None => Value::object(),
    };

    let mut engine = Engine::new();
    let (names, raw) = match &config.input {
        Input::File(path) => load_file(&mut engine, path)?,
        Input::Stdin(raw) => (engine.parse_templates(raw)?, raw.clone()),
    };

    let name = match (&config.template, names.first()) {
        (Some(name), _) => name.clone(),
        (None, Some(first)) => first.clone(),
        (None, None) => {
            engine.register_template(DOCUMENT, &raw)?;
            DOCUMENT.to_string()
        }
    };

    let rendered = engine.render_with(&name, data, Default::default(), RenderOptions::html())?;
    println!("{}", rendered.html);
    if config.stats {
        debug_report::print_render(&name, &rendered, config.color);
    }
    Ok(())
}

/// Load a markup file through the engine loader. Returns the registered
/// template names and the raw text.
fn load_file(engine: &mut Engine, path: &Path) -> kandybars::Result<(Vec<String>, String)> {
    let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let id = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let loader = FsLoader::new(base);
    match engine.load(&loader, id)? {
        Loaded::Templates(names) => {
            let raw = kandybars::SourceLoader::load(&loader, id)?;
            Ok((names, raw))
        }
        Loaded::Companion(_) | Loaded::Skipped => Err(kandybars::Error::Load {
            id: id.to_string(),
            message: "not a markup file (expected .html, .hbml, .kbml or .tpl)".to_string(),
        }),
    }
}

enum Input {
    File(std::path::PathBuf),
    Stdin(String),
}

struct CliConfig {
    input: Input,
    template: Option<String>,
    data: Option<String>,
    stats: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut file: Option<String> = None;
    let mut template: Option<String> = None;
    let mut data: Option<String> = None;
    let mut stats = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("kandybars {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--stats" => stats = true,
            "-t" | "--template" => {
                template = Some(args.next().ok_or_else(|| "error: --template expects a name".to_string())?);
            }
            "-d" | "--data" => {
                let path = args.next().ok_or_else(|| "error: --data expects a file".to_string())?;
                set_data(&mut data, read_data_file(&path)?)?;
            }
            "--json" => {
                let raw = args.next().ok_or_else(|| "error: --json expects a value".to_string())?;
                set_data(&mut data, raw)?;
            }
            _ if arg.starts_with("--template=") => template = Some(arg.trim_start_matches("--template=").to_string()),
            _ if arg.starts_with("--data=") => {
                set_data(&mut data, read_data_file(arg.trim_start_matches("--data="))?)?;
            }
            _ if arg.starts_with("--json=") => set_data(&mut data, arg.trim_start_matches("--json=").to_string())?,
            "-" => set_file(&mut file, arg)?,
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => set_file(&mut file, arg)?,
        }
    }

    let input = match file.as_deref() {
        None | Some("-") => {
            let raw = read_stdin_input()?;
            if raw.trim().is_empty() {
                return Err(format!("error: no input provided\n\n{}", help_text()));
            }
            Input::Stdin(raw)
        }
        Some(path) => Input::File(path.into()),
    };

    Ok(CliConfig { input, template, data, stats, color })
}

fn set_file(file: &mut Option<String>, value: String) -> Result<(), String> {
    if file.is_some() {
        return Err("error: input provided multiple times".to_string());
    }
    *file = Some(value);
    Ok(())
}

fn set_data(data: &mut Option<String>, value: String) -> Result<(), String> {
    if data.is_some() {
        return Err("error: data provided multiple times (use either --data or --json)".to_string());
    }
    *data = Some(value);
    Ok(())
}

fn read_data_file(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|err| format!("error: failed to read data file '{path}': {err}"))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "kandybars {version}

Render mustache-like HTML templates.

Usage:
  kandybars [OPTIONS] <file>
  kandybars [OPTIONS] [-] < file

The input is either a markup file with <template name=\"…\"> blocks or a bare
template. Without --template the first declared template is rendered; a file
without declarations is rendered as a whole.

Options:
  -t, --template <name>      Template to render.
  -d, --data <file>          JSON file with the render data.
  --json <text>              Inline JSON render data.
  --stats                    Print per-pass timings and partials after the HTML.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  KANDYBARS_LOG              Log filter (e.g. debug, kandybars=trace). Default: warn.

Exit codes:
  0  Success.
  1  Render or load error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
