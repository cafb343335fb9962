mod args;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process;

use clap::Parser;

use lazuli_eval::observer::TracingObserver;
use lazuli_eval::{wire, Error, ErrorKind, ExecutionEngine};

use args::{Args, Command};

fn main() {
    let args = Args::parse();

    let engine = if args.debug {
        ExecutionEngine::with_observer(Box::new(TracingObserver::new(io::stderr())))
    } else {
        ExecutionEngine::new()
    };

    if args.nocatch {
        execute(&engine, &args.command).expect("execution failed");
        return;
    }

    if let Err(err) = execute(&engine, &args.command) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn execute(engine: &ExecutionEngine, command: &Command) -> Result<(), Error> {
    match command {
        Command::Run { files } => {
            for file in files {
                engine.exec_file(file)?;
            }
        }

        Command::Runspec { rsfile } => {
            let spec = if rsfile == "-" {
                wire::read_value(&mut io::stdin().lock())
            } else {
                let file = File::open(rsfile).map_err(ErrorKind::from)?;
                wire::read_value(&mut BufReader::new(file))
            }
            .map_err(ErrorKind::from)?;

            engine.exec_runspec(&spec)?;
        }
    }

    let values = engine.finish()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    wire::write_results(&mut out, &values).map_err(ErrorKind::from)?;
    out.flush().map_err(ErrorKind::from)?;

    Ok(())
}
