use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    geosweep::app::run(std::env::args().skip(1))
}
