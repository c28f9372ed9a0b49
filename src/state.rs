use std::sync::Arc;

use crate::model::Model;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<Model>,
}

impl AppState {
    pub fn new(model: Model) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}
