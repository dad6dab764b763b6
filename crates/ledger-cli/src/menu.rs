use crate::session::Session;
use anyhow::Result;
use ledger_core::{chain::ChainStore, Block, LedgerError, Mined};
use std::io::{BufRead, Write};

const MENU: &str = "
=== Ledger Menu ===
1. Mine a new block
2. Show chain
3. Set difficulty
4. Validate chain
5. Exit";

const RULE: &str = "-------------------------------------------------";

pub fn render_block(block: &Block) -> String {
    format!(
        "Index         : {}\n\
         Timestamp     : {}\n\
         Data          : {}\n\
         Nonce         : {}\n\
         Hash          : {}\n\
         PreviousHash  : {}\n\
         Difficulty    : {}",
        block.index,
        block.timestamp,
        block.data,
        block.nonce,
        block.hash,
        block.previous_hash,
        block.difficulty
    )
}

pub fn render_chain(blocks: &[Block]) -> String {
    if blocks.is_empty() {
        return "Chain is empty.".to_string();
    }
    let mut out = String::from("=== Chain ===\n");
    for block in blocks {
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&render_block(block));
        out.push('\n');
    }
    out.push_str(RULE);
    out
}

pub fn report_mined(out: &mut impl Write, mined: &Mined) -> std::io::Result<()> {
    writeln!(out, "New block added:")?;
    writeln!(out, "{}", render_block(&mined.block))?;
    writeln!(
        out,
        "Elapsed       : {:?} ({} hashes on {} workers)",
        mined.elapsed, mined.attempts, mined.workers
    )
}

/// Reads one trimmed line; `None` at end of input.
fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> Result<Option<String>> {
    write!(out, "{label}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Asks until the unsaved tip is either saved or discarded. Returns `false` at
/// end of input, leaving the block unsaved.
fn resolve_unsaved<S, R, W>(session: &mut Session<S>, input: &mut R, out: &mut W) -> Result<bool>
where
    S: ChainStore,
    R: BufRead,
    W: Write,
{
    while session.has_unsaved_block() {
        let Some(choice) = prompt(input, out, "[r]etry saving or [d]iscard the block: ")? else {
            return Ok(false);
        };
        match choice.as_str() {
            "r" => match session.retry_save() {
                Ok(()) => writeln!(out, "Block saved.")?,
                Err(err) => writeln!(out, "Save failed again: {err}")?,
            },
            "d" => {
                if let Some(block) = session.discard_unsaved() {
                    writeln!(out, "Block {} discarded.", block.index)?;
                }
            }
            _ => writeln!(out, "Choose r or d.")?,
        }
    }
    Ok(true)
}

/// The interactive loop. Returns on option 5 or end of input.
pub fn run<S, R, W>(session: &mut Session<S>, mut input: R, mut out: W) -> Result<()>
where
    S: ChainStore,
    R: BufRead,
    W: Write,
{
    loop {
        writeln!(out, "{MENU}")?;
        let Some(option) = prompt(&mut input, &mut out, "Choose an option: ")? else {
            return Ok(());
        };

        match option.as_str() {
            "1" => {
                let Some(data) = prompt(&mut input, &mut out, "Data to mine: ")? else {
                    return Ok(());
                };
                writeln!(out, "Mining at difficulty {}...", session.difficulty())?;
                match session.mine_block(&data) {
                    Ok(mined) => report_mined(&mut out, &mined)?,
                    Err(err @ LedgerError::Unsaved { .. }) => {
                        writeln!(out, "Block not saved: {err}")?;
                        if !resolve_unsaved(session, &mut input, &mut out)? {
                            return Ok(());
                        }
                    }
                    Err(err) => writeln!(out, "Mining failed: {err}")?,
                }
            }
            "2" => writeln!(out, "{}", render_chain(session.blocks()))?,
            "3" => {
                let Some(input_line) = prompt(
                    &mut input,
                    &mut out,
                    "New difficulty (leading zeros in the hash): ",
                )?
                else {
                    return Ok(());
                };
                match session.set_difficulty(&input_line) {
                    Ok(difficulty) => writeln!(out, "Difficulty set to {difficulty}.")?,
                    Err(err) => writeln!(out, "{err}")?,
                }
            }
            "4" => {
                writeln!(out, "Validating chain...")?;
                writeln!(out, "{}", session.validate())?;
            }
            "5" => {
                writeln!(out, "Exiting.")?;
                return Ok(());
            }
            _ => writeln!(out, "Invalid option, choose 1-5.")?,
        }
    }
}
