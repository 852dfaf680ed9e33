//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `athena_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;

fn main() -> ExitCode {
    println!("athena_core ping={}", athena_core::ping());
    println!("athena_core version={}", athena_core::core_version());

    let catalog = match athena_core::BookCatalog::builtin() {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("athena_core catalog error={err}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "athena_core catalog books={} free={} premium={} featured={} kids={}",
        catalog.len(),
        catalog.free_books().len(),
        catalog.premium_books().len(),
        catalog.featured().len(),
        catalog.kids().len()
    );
    ExitCode::SUCCESS
}
