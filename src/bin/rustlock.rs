use anyhow::Result;

fn main() -> Result<()> {
    rustlock::cli::run()
}
