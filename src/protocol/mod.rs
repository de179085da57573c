pub mod openai;
pub mod upstream;
