/// Cargo build variables re-exported for `rilbridge version --extended`.
const BUILD_INFO: &[(&str, &str)] = &[
    ("TARGET", "RILBRIDGE_BUILD_TARGET"),
    ("PROFILE", "RILBRIDGE_BUILD_PROFILE"),
];

fn main() {
    for (cargo_var, exported) in BUILD_INFO {
        if let Ok(value) = std::env::var(cargo_var) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={cargo_var}");
    }
}
