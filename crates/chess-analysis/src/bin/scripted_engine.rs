//! Scripted UCI engine used by the engine-session tests.
//!
//! Scores are derived from the position alone: `30 - 10 * moves` centipawns
//! for the side to move, where `moves` is the length of the move list. A few
//! depths trigger special behaviour:
//!
//! - depth 97: `bestmove` without any score
//! - depth 98: `score mate 3`
//! - depth 99: exits without answering
//! - depth 100 and above: stays silent until `stop`

use uci::{stdio_engine, GuiCommand, InfoBuilder, UciError};

fn main() -> Result<(), UciError> {
    let mut engine = stdio_engine();
    let mut moves_played = 0usize;

    while let Some(cmd) = engine.read_command()? {
        match cmd {
            GuiCommand::Uci => {
                engine.send_id("ScriptedEngine", "Chess Devtools")?;
                engine.send_uciok()?;
            }

            GuiCommand::IsReady => engine.send_readyok()?,

            GuiCommand::UciNewGame => moves_played = 0,

            GuiCommand::Position { moves, .. } => moves_played = moves.len(),

            GuiCommand::Go(opts) => {
                let depth = opts.depth.unwrap_or(1);
                match depth {
                    97 => engine.send_bestmove("e2e4")?,
                    98 => {
                        engine.send_info(InfoBuilder::new().depth(depth).score_mate(3).build())?;
                        engine.send_bestmove("d1h5")?;
                    }
                    99 => std::process::exit(3),
                    100.. => {}
                    _ => {
                        let cp = 30 - 10 * moves_played as i32;
                        // A fail-high line and a second PV line that must not win.
                        let mut bound = InfoBuilder::new().depth(1).score_cp(cp + 500).build();
                        bound.bound = true;
                        engine.send_info(bound)?;
                        for d in 1..=depth.min(3) {
                            let info = InfoBuilder::new()
                                .depth(d)
                                .score_cp(cp)
                                .nodes(u64::from(d) * 100)
                                .build();
                            engine.send_info(info)?;
                        }
                        let mut second = InfoBuilder::new().depth(depth).score_cp(cp - 300).build();
                        second.multipv = Some(2);
                        engine.send_info(second)?;
                        engine.send_bestmove("e2e4")?;
                    }
                }
            }

            GuiCommand::Stop => engine.send_bestmove("0000")?,

            GuiCommand::Quit => break,

            GuiCommand::Unknown(_) => {}
        }
    }

    Ok(())
}
