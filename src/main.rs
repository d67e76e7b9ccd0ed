fn main() {
    unixlauncher_lib::run()
}
