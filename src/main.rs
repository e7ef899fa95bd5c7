fn main() -> anyhow::Result<()> {
    pacing_simulator::cli::run_cli()
}
