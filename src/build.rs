use vergen_git2::{Emitter, Git2Builder};

pub fn main() -> anyhow::Result<()> {
    // Short commit hash, logged on startup
    let git2 = Git2Builder::default().sha(true).build()?;

    Emitter::default().add_instructions(&git2)?.emit()?;
    Ok(())
}
