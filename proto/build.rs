use std::fs;

fn main() {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }
    let kvstore_out_dir = "target/kvstore";
    fs::create_dir_all(kvstore_out_dir).unwrap();
    tonic_build::configure()
        .build_server(true)
        .out_dir(kvstore_out_dir)
        .compile(
            &["src/kvstore.proto"],
            &["src"], // specify the root location to search proto dependencies
        )
        .unwrap();
}
