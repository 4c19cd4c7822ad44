//! Ask command

use crate::app::{AskArgs, OutputFormat};
use crate::output::{self, json, terminal};
use anyhow::Result;
use futures::StreamExt;
use ragline_core::pipeline::validate_question;
use ragline_core::{Config, Runtime};
use std::io::Write;

pub async fn run(args: AskArgs, mut config: Config, format: OutputFormat) -> Result<()> {
    let question = args.question.join(" ");
    validate_question(&question)?;

    if let Some(top_k) = args.top_k {
        config.rag.top_k = top_k;
    }
    if let Some(min_score) = args.min_score {
        config.rag.min_score = min_score;
    }

    let runtime = Runtime::new(config)?;
    let model = args.model.as_deref();

    if !args.stream {
        let response = runtime.answer(&question, model).await?;
        print!("{}", output::format_response(&response, format));
        return Ok(());
    }

    let mut answer = runtime.answer_stream(&question, model).await?;
    let mut stdout = std::io::stdout();

    while let Some(fragment) = answer.fragments.next().await {
        let fragment = match fragment {
            Ok(fragment) => fragment,
            Err(e) => {
                if format == OutputFormat::Cli {
                    writeln!(stdout)?;
                }
                return Err(e.into());
            }
        };
        match format {
            OutputFormat::Json => write!(stdout, "{}", json::format_fragment(&fragment))?,
            OutputFormat::Cli => write!(stdout, "{}", fragment)?,
        }
        stdout.flush()?;
    }

    match format {
        OutputFormat::Json => write!(
            stdout,
            "{}",
            json::format_stream_end(&answer.sources, &answer.model, answer.used_fallback)
        )?,
        OutputFormat::Cli => write!(
            stdout,
            "\n\n{}{}",
            terminal::format_sources(&answer.sources),
            terminal::format_model_line(&answer.model, answer.used_fallback)
        )?,
    }
    Ok(())
}
