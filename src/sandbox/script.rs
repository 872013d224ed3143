//! Script composition for sandboxed snippets

use crate::dataset::DatasetContext;

/// Name pandas is imported under
pub const PANDAS_BINDING: &str = "pd";

/// Name the non-interactive pyplot module is imported under
pub const PLOT_BINDING: &str = "plt";

/// Build the full script: preamble, dataset binding, then the snippet verbatim.
pub fn compose_script(dataset: &DatasetContext, code: &str) -> String {
    format!(
        "import warnings\n\
         warnings.filterwarnings(\"ignore\")\n\
         import pandas as {PANDAS_BINDING}\n\
         import matplotlib\n\
         matplotlib.use(\"Agg\")\n\
         import matplotlib.pyplot as {PLOT_BINDING}\n\
         \n\
         {load}\n\
         \n\
         {code}\n",
        load = dataset.load_statement(),
    )
}
