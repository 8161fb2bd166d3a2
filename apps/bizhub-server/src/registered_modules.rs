// Modules are registered explicitly; order matters in strict mode, so a
// module must come after everything it depends on.

use std::sync::Arc;

use bizkit::Module;

pub fn all() -> Vec<Arc<dyn Module>> {
    vec![
        Arc::new(clients::ClientsModule::new()),
        Arc::new(invoices::InvoicesModule::new()),
    ]
}
