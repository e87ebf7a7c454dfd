use std::{env, fs, process::ExitCode};

use hql::{CompileOptions, compile};

const USAGE: &str = "usage: hql <file.hql> [--json] [--no-helpers]";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut file_path = None;
    let mut json = false;
    let mut emit_helpers = true;
    for arg in &args {
        match arg.as_str() {
            "--json" => json = true,
            "--no-helpers" => emit_helpers = false,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            other if other.starts_with('-') => {
                eprintln!("unknown flag `{other}`\n{USAGE}");
                return ExitCode::FAILURE;
            }
            other => {
                if file_path.replace(other).is_some() {
                    eprintln!("expected exactly one input file\n{USAGE}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    let Some(file_path) = file_path else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let options = CompileOptions {
        filename: file_path.to_owned(),
        emit_helpers,
        ..CompileOptions::default()
    };
    let output = compile(&source, &options);

    if json {
        match serde_json::to_string_pretty(&output.diagnostics) {
            Ok(diagnostics) => eprintln!("{diagnostics}"),
            Err(err) => {
                eprintln!("error: cannot serialize diagnostics: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        for diagnostic in &output.diagnostics {
            eprintln!("{diagnostic}");
        }
    }

    match output.code {
        Some(code) => {
            print!("{code}");
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}
