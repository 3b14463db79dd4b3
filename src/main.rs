mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod shellenv;

fn main() {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            match error::code_of(&err) {
                Some(code) => eprintln!("error[{}]: {err:#}", code.as_str()),
                None => eprintln!("error: {err:#}"),
            }
            std::process::exit(1);
        }
    }
}
