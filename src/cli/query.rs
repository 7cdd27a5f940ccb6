use anyhow::Result;

use grokker::config::GrokConfig;

/// Answer a question from the command line.
pub fn ask(config: &GrokConfig, question: &str, global: bool) -> Result<()> {
    let grok = super::open_fresh(config)?;
    let answer = grok.answer(question, global)?;
    println!("{answer}");
    Ok(())
}

/// Revise text read from stdin.
pub fn revise(config: &GrokConfig, global: bool, sysmsg_in: bool) -> Result<()> {
    let input = super::read_stdin()?;
    let grok = super::open_fresh(config)?;
    let revision = grok.revise(&input, global, sysmsg_in)?;
    println!("{}", revision.output);
    Ok(())
}

/// Continue text read from stdin. The input is echoed before the continuation.
pub fn continue_text(config: &GrokConfig, global: bool) -> Result<()> {
    let input = super::read_stdin()?;
    let grok = super::open_fresh(config)?;
    let continuation = grok.continue_text(&input, global)?;
    println!("{}\n{}", input.trim_end(), continuation.output);
    Ok(())
}
