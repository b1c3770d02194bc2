use std::fmt;

use anyhow::bail;
use log::info;
use pest::{error::Error as PestError, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::tree::{
    Genealogy, Node,
    NodeIdx::{Internal as Int, Leaf},
};
use crate::Result;

#[derive(Parser)]
#[grammar = "./tree/newick.pest"]
pub struct NewickParser;

#[derive(Debug)]
pub(crate) struct ParsingError(pub(crate) Box<PestError<Rule>>);

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Malformed newick string")?;
        write!(f, "{}", self.0)
    }
}

/// Parses newick trees into genealogies. Node heights are derived from the
/// branch lengths: the deepest tip sits at height zero, every other node at
/// its distance above it.
pub fn from_newick(newick_string: &str) -> Result<Vec<Genealogy>> {
    info!("Parsing newick genealogies.");
    let mut trees = Vec::new();
    let newick_rule = match NewickParser::parse(Rule::newick, newick_string) {
        Ok(mut pairs) => pairs.next().unwrap(),
        Err(error) => bail!(ParsingError(Box::new(error))),
    };
    match newick_rule.as_rule() {
        Rule::newick => {
            for tree_rule in newick_rule.into_inner() {
                if tree_rule.as_rule() != Rule::tree {
                    continue;
                }
                let mut builder = NewickBuilder::default();
                let subtree_rule = tree_rule.into_inner().next().unwrap();
                match subtree_rule.as_rule() {
                    Rule::internal => {
                        builder.parse_internal(subtree_rule);
                    }
                    Rule::leaf => {
                        builder.parse_leaf(subtree_rule);
                    }
                    _ => unreachable!(),
                }
                trees.push(builder.into_genealogy()?);
            }
        }
        _ => unreachable!(),
    }
    info!("Finished parsing newick genealogies successfully.");
    Ok(trees)
}

/// Accumulates nodes and their parsed branch lengths; heights are computed
/// once the whole tree is known.
#[derive(Default)]
struct NewickBuilder {
    nodes: Vec<Node>,
    blens: Vec<f64>,
}

impl NewickBuilder {
    fn parse_internal(&mut self, rule: Pair<Rule>) -> usize {
        let cur_idx = self.nodes.len();
        self.nodes
            .push(Node::new_internal(cur_idx, None, Vec::new(), 0.0, "".to_string()));
        self.blens.push(0.0);
        let mut id = String::from("");
        let mut blen = 0.0;
        let mut children = Vec::new();
        for inner_rule in rule.into_inner() {
            match inner_rule.as_rule() {
                Rule::label => id = inner_rule.as_str().to_string(),
                Rule::branch_length => blen = Self::parse_branch_length(inner_rule),
                Rule::internal => children.push(Int(self.parse_internal(inner_rule))),
                Rule::leaf => children.push(Leaf(self.parse_leaf(inner_rule))),
                _ => unreachable!(),
            }
        }
        for &child in &children {
            self.nodes[usize::from(child)].parent = Some(Int(cur_idx));
        }
        self.nodes[cur_idx].id = id;
        self.nodes[cur_idx].children = children;
        self.blens[cur_idx] = blen;
        cur_idx
    }

    fn parse_leaf(&mut self, rule: Pair<Rule>) -> usize {
        let cur_idx = self.nodes.len();
        let mut id = String::from("");
        let mut blen = 0.0;
        for inner_rule in rule.into_inner() {
            match inner_rule.as_rule() {
                Rule::label => id = inner_rule.as_str().to_string(),
                Rule::branch_length => blen = Self::parse_branch_length(inner_rule),
                _ => unreachable!(),
            }
        }
        self.nodes.push(Node::new_leaf(cur_idx, None, 0.0, id));
        self.blens.push(blen);
        cur_idx
    }

    fn parse_branch_length(rule: Pair<Rule>) -> f64 {
        rule.into_inner()
            .next()
            .unwrap()
            .as_str()
            .trim()
            .parse::<f64>()
            .unwrap_or_default()
    }

    fn into_genealogy(self) -> Result<Genealogy> {
        let mut depths = vec![0.0; self.nodes.len()];
        let mut stack = vec![0usize];
        while let Some(cur_idx) = stack.pop() {
            for &child in &self.nodes[cur_idx].children {
                let child = usize::from(child);
                depths[child] = depths[cur_idx] + self.blens[child];
                stack.push(child);
            }
        }
        let max_depth = depths.iter().cloned().fold(0.0, f64::max);
        let mut genealogy = Genealogy::new_empty();
        genealogy.nodes = self.nodes;
        for (node, depth) in genealogy.nodes.iter_mut().zip(depths) {
            node.height = (max_depth - depth).max(0.0);
        }
        genealogy.finish()?;
        Ok(genealogy)
    }
}
