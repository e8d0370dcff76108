fn main() {
    radar_extract::cli::run();
}
