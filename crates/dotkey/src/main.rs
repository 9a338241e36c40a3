fn main() {
    dotkey_cli::run_main();
}
