use std::io::{self, Write};

use adverify_llm::verifier::{Verdict, VerificationVerdict};
use clap::ValueEnum;
use crossterm::style::Stylize;
use serde_json::{Value, json};

use crate::pipeline::Outcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn render(outcome: &Outcome, format: OutputFormat, out: &mut impl Write) -> io::Result<()> {
    match format {
        OutputFormat::Text => render_text(outcome, out),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &to_json(outcome))?;
            writeln!(out)
        }
    }
}

fn render_text(outcome: &Outcome, out: &mut impl Write) -> io::Result<()> {
    match outcome {
        Outcome::Verified {
            model,
            source_chars,
            verdict,
        } => {
            writeln!(
                out,
                "{} {}",
                "Verification".cyan().bold(),
                format!("({model}, {source_chars} chars of source)").dark_grey()
            )?;
            render_verdict(verdict, out)
        }
        Outcome::Rejected(e) | Outcome::ScrapeFailed(e) | Outcome::VerifyFailed(e) => {
            let heading = match outcome {
                Outcome::Rejected(_) => "Cannot start",
                Outcome::ScrapeFailed(_) => "Scrape failed",
                _ => "Verification failed",
            };
            writeln!(out, "{} {e}", format!("{heading}:").red().bold())?;
            if let Some(raw) = e.raw_reply() {
                writeln!(out, "{}", "Raw model reply:".yellow())?;
                writeln!(out, "{raw}")?;
            }
            Ok(())
        }
    }
}

fn render_verdict(v: &VerificationVerdict, out: &mut impl Write) -> io::Result<()> {
    let label = match v.verdict {
        Verdict::Pass => v.verdict.as_str().green().bold(),
        Verdict::Fail => v.verdict.as_str().red().bold(),
    };
    writeln!(out, "  Verdict: {label}")?;
    writeln!(out, "  Score:   {}/100", v.score)?;
    writeln!(out, "  Tone:    {}", v.tone_consistency)?;

    if v.hallucinations.is_empty() {
        writeln!(out, "  {}", "No unsupported claims found.".green())?;
    } else {
        writeln!(out, "  {}", "Unsupported claims:".yellow())?;
        for claim in &v.hallucinations {
            writeln!(out, "    - {claim}")?;
        }
    }

    if !v.is_consistent() {
        writeln!(
            out,
            "  {}",
            "Warning: PASS requires a score above 80 and no unsupported claims.".yellow()
        )?;
    }
    Ok(())
}

fn to_json(outcome: &Outcome) -> Value {
    match outcome {
        Outcome::Verified {
            model,
            source_chars,
            verdict,
        } => json!({
            "status": outcome.label(),
            "model": model,
            "source_chars": source_chars,
            "consistent": verdict.is_consistent(),
            "result": verdict,
        }),
        Outcome::Rejected(e) | Outcome::ScrapeFailed(e) | Outcome::VerifyFailed(e) => json!({
            "status": outcome.label(),
            "error": {
                "category": e.category(),
                "message": e.to_string(),
                "raw_reply": e.raw_reply(),
            },
        }),
    }
}
