use anyhow::Result;

fn main() -> Result<()> {
    waylink::cli::run()
}
