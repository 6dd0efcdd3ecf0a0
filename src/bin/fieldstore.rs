fn main() -> anyhow::Result<()> {
    fieldstore::cli::main()
}
