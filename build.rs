fn main() {
    slint_build::compile("ui/main.slint").expect("Slint build failed");
}
