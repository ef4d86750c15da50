fn main() {
    println!("cargo:rerun-if-env-changed=PAWFEED_PROJECT_ID");
    println!("cargo:rerun-if-env-changed=PAWFEED_DATABASE_URL");
    println!("cargo:rerun-if-env-changed=PAWFEED_API_KEY");

    // Host builds (unit tests, fuzzing) have no ESP-IDF environment to export.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
