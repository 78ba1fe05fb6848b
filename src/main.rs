fn main() {
    tubeplay_lib::run()
}
