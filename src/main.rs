fn main() -> anyhow::Result<()> {
    mindmirror_lib::run()
}
