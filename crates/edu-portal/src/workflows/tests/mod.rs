mod cms;
mod common;
