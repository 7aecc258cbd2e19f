fn main() {
    if let Err(err) = model_graph_renderer::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
