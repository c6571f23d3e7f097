fn main() -> anyhow::Result<()> {
    archnote::cli::run()
}
