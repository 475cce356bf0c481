fn main() {
    fastscan_pipeline::cli::run();
}
