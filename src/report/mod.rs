pub mod table;
pub mod json;

use crate::checkpoint::Checkpoint;
use crate::error::Result;

pub fn print_list(checkpoints: &[Checkpoint], json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", json::render_list(checkpoints)?);
    } else {
        print!("{}", table::render_list(checkpoints));
    }
    Ok(())
}

pub fn print_info(checkpoint: &Checkpoint, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", json::render_info(checkpoint)?);
    } else {
        print!("{}", table::render_info(checkpoint));
    }
    Ok(())
}
