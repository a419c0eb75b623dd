pub mod kvstore {
    include!("../target/kvstore/kvstore.rs");
}
