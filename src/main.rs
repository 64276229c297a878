use std::path::Path;

use clap::Parser as ClapParser;

use isla::{parse_formula, parse_grammar, IslaError, SemanticRegistry};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
struct Options {
    /// The BNF reference grammar file
    grammar: String,
    /// The ISLa constraint file
    constraint: String,
    /// Print the formula back in normalised concrete syntax
    #[arg(short, long)]
    print: bool,
}

fn main() {
    env_logger::init();
    let ts = std::time::Instant::now();
    let cli = Options::parse();
    for file in [&cli.grammar, &cli.constraint] {
        if !Path::new(file).exists() {
            panic!("File not found: {}", file);
        }
    }
    match run(&cli) {
        Ok(()) => log::info!("Done ({}ms).", ts.elapsed().as_millis()),
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Options) -> Result<(), IslaError> {
    let grammar_text = std::fs::read_to_string(&cli.grammar).expect("grammar file is readable");
    let constraint_text =
        std::fs::read_to_string(&cli.constraint).expect("constraint file is readable");

    let grammar = parse_grammar(&grammar_text)?;
    log::debug!(
        "Parsed grammar with {} nonterminals.",
        grammar.nonterminals().count()
    );
    let registry = SemanticRegistry::new();
    let constraint = parse_formula(&constraint_text, &grammar, &registry)?;
    if cli.print {
        println!("{}", constraint);
    } else {
        println!("ok");
    }
    Ok(())
}
