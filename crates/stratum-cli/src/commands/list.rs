// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lists the templates of a project.

use crate::config::Config;

/// Prints every template as `namespace:name`.
pub fn run(config: &Config) -> anyhow::Result<()> {
    for template in config.engine()?.list()? {
        println!("{}", template);
    }
    Ok(())
}
