fn main() -> std::process::ExitCode {
    netplay_lib::run()
}
