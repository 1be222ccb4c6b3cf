// MuMIDI codec: CLI entry point.
//
// Subcommands:
//   mumidi encode <input.mid> <tokens.json> [--params FILE] [--save-params FILE]
//   mumidi decode <tokens.json> <output.mid> [--params FILE] [--ticks N]
//   mumidi check <tokens.json> [--params FILE]
//   mumidi vocab [--params FILE]
//
// Without --params the default configuration is used. Encoding may grow the
// bar embedding; pass --save-params to keep the grown vocabulary for later
// decode/check runs. Set RUST_LOG=debug for pipeline details.

use mumidi_codec::midi::load_midi;
use mumidi_codec::{CodecResult, MuMidiTokenizer, TokenizerConfig};
use std::path::Path;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let positional: Vec<&str> = positional_args(args.get(1..).unwrap_or(&[]));
    let result = match positional.as_slice() {
        ["encode", input, output] => encode(&args, Path::new(input), Path::new(output)),
        ["decode", input, output] => decode(&args, Path::new(input), Path::new(output)),
        ["check", input] => check(&args, Path::new(input)),
        ["vocab"] => vocab(&args),
        _ => {
            eprintln!("Usage:");
            eprintln!("  mumidi encode <input.mid> <tokens.json> [--params FILE] [--save-params FILE]");
            eprintln!("  mumidi decode <tokens.json> <output.mid> [--params FILE] [--ticks N]");
            eprintln!("  mumidi check <tokens.json> [--params FILE]");
            eprintln!("  mumidi vocab [--params FILE]");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_tokenizer(args: &[String]) -> CodecResult<MuMidiTokenizer> {
    match parse_flag::<String>(args, "--params") {
        Some(path) => {
            println!("Loading params from {}", path);
            MuMidiTokenizer::from_params(Path::new(&path))
        }
        None => MuMidiTokenizer::new(TokenizerConfig::default()),
    }
}

fn encode(args: &[String], input: &Path, output: &Path) -> CodecResult<()> {
    let mut tokenizer = load_tokenizer(args)?;
    let score = load_midi(input)?;
    println!(
        "Read {}: {} tracks, {} notes, {} ticks per beat",
        input.display(),
        score.instruments.len(),
        score.note_count(),
        score.ticks_per_beat
    );

    let tokens = tokenizer.encode(&score)?;
    tokenizer.save_tokens(&tokens, output)?;
    println!("Wrote {} rows to {}", tokens.len(), output.display());

    if let Some(path) = parse_flag::<String>(args, "--save-params") {
        tokenizer.save_params(Path::new(&path))?;
        println!(
            "Saved params to {} (bar embedding: {})",
            path,
            tokenizer.vocab().bar_capacity()
        );
    }
    Ok(())
}

fn decode(args: &[String], input: &Path, output: &Path) -> CodecResult<()> {
    let tokenizer = load_tokenizer(args)?;
    let ticks: u32 = parse_flag(args, "--ticks").unwrap_or(480);
    let tokens = tokenizer.load_tokens(input)?;
    let score = tokenizer.decode_to_file(&tokens, ticks, output)?;
    println!(
        "Wrote {}: {} tracks, {} notes",
        output.display(),
        score.instruments.len(),
        score.note_count()
    );
    Ok(())
}

fn check(args: &[String], input: &Path) -> CodecResult<()> {
    let tokenizer = load_tokenizer(args)?;
    let tokens = tokenizer.load_tokens(input)?;
    let report = tokenizer.validate(&tokens);
    println!(
        "{}: {} rows, {} errors, error ratio {:.4}",
        input.display(),
        report.rows,
        report.errors,
        report.ratio()
    );
    Ok(())
}

fn vocab(args: &[String]) -> CodecResult<()> {
    let tokenizer = load_tokenizer(args)?;
    let vocab = tokenizer.vocab();
    println!("Fields: {}", vocab.fields().len());
    for (i, field) in vocab.fields().iter().enumerate() {
        let sample: Vec<&str> = field
            .labels()
            .iter()
            .skip(tokenizer.config().special_tokens.len())
            .take(3)
            .map(String::as_str)
            .collect();
        println!("  [{}] {} labels ({}, ...)", i, field.len(), sample.join(", "));
    }
    Ok(())
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
        } else if arg.starts_with("--") {
            skip = true;
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
