// jample: featherweight template preprocessor.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use jample::builtin::root_spec;
use jample::cli::Cli;
use jample::config::Config;
use jample::instruction::ExecContext;
use jample::memory::Memory;
use jample::reference::{DocumentHandle, PseudoDocument};
use jample::unit::{seed_builtin_heap, Unit};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(rendered) => {
            print!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Drive a document through the full pipeline and return its rendered
/// console output. `anyhow` wraps every failure with the file it came
/// from; `Unit`'s own diagnostics are flushed to stderr as they're filed
/// (see `diagnostic.rs`'s `log` mirroring), not collected here.
fn run(cli: &Cli) -> Result<String> {
    let config = Config::load(&cli.config_path()).with_context(|| format!("loading {}", cli.config_path().display()))?;
    let trace = cli.trace.unwrap_or(config.trace);
    env_logger::Builder::new().filter_level(trace.to_filter()).init();

    let path = &cli.file;
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let document = DocumentHandle::new(PseudoDocument::new(path.display().to_string(), content));

    let mut unit = Unit::new(root_spec());
    unit.initialize(document.clone());
    unit.parse(&document).with_context(|| format!("parsing {}", path.display()))?;
    unit.analyze(&document).with_context(|| format!("analyzing {}", path.display()))?;
    let instruction = unit.compile(&document).with_context(|| format!("compiling {}", path.display()))?;

    // Can't use `Unit::execute` here: it builds its own fresh `Memory`
    // internally, with no seam to seed the builtin heap first.
    let mut memory = Memory::new();
    seed_builtin_heap(&mut memory, &document);
    let mut ctx = ExecContext { document: document.clone(), diagnostics: unit.environment_mut().diagnostics_mut() };
    instruction.exec(&mut ctx, &mut memory).with_context(|| format!("executing {}", path.display()))?;
    Ok(memory.root().console().to_string())
}
