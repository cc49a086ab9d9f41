fn main() -> std::process::ExitCode {
    unidl_lib::run()
}
